//! Region CRUD, split into read and write halves.

mod read;
mod write;
