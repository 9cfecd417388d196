//! Miscellaneous common structs used throughout the library.

mod id;
pub mod messages;
mod neighbor_list;
mod prefix_tree;
mod routing_table;

pub use id::*;
pub use messages::*;
pub use neighbor_list::*;
pub use prefix_tree::*;
pub use routing_table::*;
