//! Index array model.
//!
//! This module contains **pure** data types: the serialized index array
//! (`offsets`, `file`, `era`, `prefix`), the decoding descriptors stored in
//! era records, and the concatenation of independently collected arrays.
//! Nothing here touches storage; persistence lives in [`crate::store`].

pub mod concat;
pub mod interpretation;
pub mod model;

pub use concat::concatenate;
pub use interpretation::{Descriptor, Interpretation};
pub use model::{BasketSeek, EraRecord, FileRow, IndexArray, IndexShapeError};
