//! # Authentication and Authorization
//!
//! The identity-provider contract and the pipeline handlers built on it.

pub mod accounts;
pub mod admin;
pub mod authenticate;
pub mod service;

pub use accounts::{AccountCreate, AdminCreate, BlockStatus, BlockStatusUpdate};
pub use admin::AdminElevationChecker;
pub use authenticate::{AuthMode, TokenAuthenticator};
pub use service::{AuthService, AuthServiceError, RemoteAuthService, SignUp, UserRecord};
