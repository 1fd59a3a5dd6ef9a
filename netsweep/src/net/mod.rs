pub mod inspect;
pub mod ping;
pub mod port;
