//! Order book module for the swap engine.
//!
//! ## Architecture
//!
//! Each pair owns one [`OrderBook`] cache over the persisted price index:
//!
//! - **Ordered index**: a `BTreeSet` of `(price, id)` keys per side, so
//!   price-time priority falls out of the key order
//! - **Lazy loading**: only a prefix of each side is materialized; walking
//!   past it range-scans the snapshot from the last loaded key
//! - **Dirty tracking**: orders changed in the current block shadow their
//!   stored copies until the next commit
//!
//! ## Components
//!
//! - [`SortKey`]: position of an order within its side
//! - [`BookSide`]: one lazily extended side
//! - [`OrderBook`]: both sides plus the order records of a pair
//!
//! ## Performance
//!
//! | Operation | Complexity |
//! |-----------|------------|
//! | Insert / resort order | O(log n) |
//! | Next order while walking | O(log n) amortized |
//! | Order at index | O(index) |
//! | Commit | O(d log d) for d dirty orders |

pub mod side;
pub mod book;

pub use side::{BookSide, SortKey};
pub use book::{FillEffect, OrderBook};
