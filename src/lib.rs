//! # Multiway B-Trees
//!
//! A disk-backed family of multiway B-trees — classical B-tree, B+-tree,
//! B*-tree and B*+-tree — persisting fixed-size ordered keys in a single
//! paged file.
//!
//! ## Architecture
//!
//! - **Page layer** (`page`): fixed-size page codec, one physical layout
//!   shared by every variant.
//! - **Storage layer** (`storage`): file header, free-page stack, and the
//!   paged file that ties page numbers to byte offsets.
//! - **Tree layer** (`btree`): the generic [`Tree`] engine plus the DOT
//!   diagnostic writer, dispatching on [`Kind`] only where the variants
//!   disagree.
//! - **Capabilities** (`comparator`, `printer`): how a tree orders its keys
//!   and how it renders them for diagnostics, supplied by the caller rather
//!   than assumed.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use multiway_btrees::{Tree, Kind, ByteComparator};
//!
//! let mut tree = Tree::create("orders.bt".as_ref(), Kind::BPlusTree, 64, 8, ByteComparator)?;
//! tree.insert(&42u64.to_le_bytes())?;
//! assert!(tree.search(&42u64.to_le_bytes())?);
//! tree.close()?;
//! ```

pub mod btree;
pub mod comparator;
pub mod error;
pub mod page;
pub mod printer;
pub mod storage;

pub use btree::{write_dot, Derived, Kind, Tree};
pub use comparator::{ByteComparator, Comparator, I64Comparator};
pub use error::{Result, TreeError};
pub use printer::{HexKeyPrinter, I64KeyPrinter, KeyPrinter};
