pub mod ring;
pub mod time;

pub use ring::{ChatHistory, ChatLine, RingBuffer};
pub use time::now_unix;
