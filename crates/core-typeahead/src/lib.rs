//! core-typeahead: the two byte stores at the heart of the input pipeline.
//!
//! [`BlockChain`] is a chain of growable byte blocks with a destructive read
//! cursor; the redo, stuff and record buffers are all instances of it.
//! [`Typeahead`] is the single linear buffer the mapping engine rewrites in
//! place, with a parallel per-byte remap mask.
//!
//! Both stores hold bytes in the wire protocol of `core-keycode`: special
//! keys are already escaped before they land here, so the stores themselves
//! never interpret what they carry (except for the convenience appenders
//! that escape on behalf of the caller).

mod chain;
mod typeahead;

pub use chain::BlockChain;
pub use typeahead::{
    FlushMode, MAXMAPLEN, RemapMask, RemapPolicy, Typeahead, TypeaheadError,
};
