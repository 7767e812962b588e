//! The Revelation-v2-compatible password database core: path codec, entry
//! schema, tree model, visitor protocol, XML codec, envelope codec, and the
//! storage/model façades that bundle them for a caller. The CLI binary in
//! this crate (`src/main.rs`) is the one concrete collaborator shipped
//! in-tree.

pub mod common;
pub mod model;
pub mod path;
pub mod schema;
pub mod storage;
pub mod visitor;
pub mod xml;
