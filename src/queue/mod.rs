// Copyright 2025 Jonas Kruckenberg
//
// Licensed under the Apache License, Version 2.0, <LICENSE-APACHE or
// http://apache.org/licenses/LICENSE-2.0> or the MIT license <LICENSE-MIT or
// http://opensource.org/licenses/MIT>, at your option. This file may not be
// copied, modified, or distributed except according to those terms.

//! The dual task queues (§4.1): a private [`Reserved`] sequence and a
//! lock-protected, bounded [`Shared`] deque.

mod reserved;
mod shared;

pub use reserved::Reserved;
pub use shared::{Shared, MAX_SHARE_LIMIT};
