//! Synclist - a local list kept in the order of a remote priority-sorted store.
//!
//! The remote store only sorts children by a floating-point priority. This
//! crate turns list operations (insert at 3, move from 5 to 1) into
//! priorities, and folds the store's change notifications back into a local
//! ordered replica.
//!
//! # Quick Start
//!
//! ```
//! use synclist::config::ListConfig;
//! use synclist::list::SyncedList;
//! use synclist::store::MemoryStore;
//!
//! let mut list = SyncedList::attach(MemoryStore::new(), ListConfig::default()).unwrap();
//!
//! list.add("first").unwrap();
//! list.add("third").unwrap();
//! list.pump();
//!
//! list.insert(1, "second").unwrap();
//! list.pump();
//!
//! let values: Vec<_> = list.iter().map(|r| r.value.to_wire()).collect();
//! assert_eq!(values, vec!["first", "second", "third"]);
//! ```

pub mod cache;
pub mod config;
pub mod error;
pub mod key;
pub mod list;
pub mod priority;
pub mod reconcile;
pub mod store;
pub mod subscription;
pub mod value;
