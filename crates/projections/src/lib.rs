//! Views: read models projected from domain events.
//!
//! A view handler writes into a view through a [`ViewContext`]. Each write
//! is stamped with the causing event's timestamp in the view's meta-state,
//! which makes updates delivered out of order converge on the same state
//! (last writer by event time wins, not by arrival).

pub mod error;
pub mod handler;
pub mod meta;
pub mod store;
pub mod view;
pub mod view_domain;

pub use error::{Result, ViewError};
pub use handler::{
    ViewContext, ViewEventHandler, ViewEventRegistration, ViewHandlerFn, ViewIdFn,
    view_handler_fn,
};
pub use meta::MetaRecord;
pub use store::{
    InMemoryViewStore, SaveAttempt, ViewIndex, ViewQuery, ViewStore, ViewStoreOptions,
};
pub use view::{View, ViewData};
pub use view_domain::ViewDomain;
