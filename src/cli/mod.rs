mod current;
mod discover;
mod rank;
mod resolve;
mod token;

pub use current::{forget_current, show_current};
pub use discover::discover_servers;
pub use rank::rank_addresses;
pub use resolve::{Target, resolve_server};
pub use token::{clear_token, set_token};
