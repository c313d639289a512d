//! Wire types shared by the driftwood server and its clients.
//!
//! Every endpoint answers with a [`ResponseResult`] envelope; request bodies and
//! list views live in [`requests`] and [`views`].

mod response;

pub mod requests;
pub mod views;

pub use requests::*;
pub use response::{ResponseResult, ResultCode};
pub use views::*;
