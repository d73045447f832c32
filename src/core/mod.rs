// Author: Dustin Pilgrim
// License: MIT

pub mod error;
pub mod identity;
pub mod locator;
pub mod users;
