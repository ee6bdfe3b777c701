//! Backend Pool Module
//!
//! Holds the ordered set of equivalent upstream credentials used for
//! failover. There is no health scoring or rotation: every request walks the
//! pool from the first credential.
//!
//! # Example
//! ```ignore
//! use backend_pool::CredentialPool;
//!
//! let pool = CredentialPool::from_newline_delimited("key-a\nkey-b");
//! for cred in pool.iter() {
//!     println!("Would try {}", cred.name());
//! }
//! ```

mod credential;
mod pool;

pub use credential::Credential;
pub use pool::CredentialPool;
