pub mod api;
pub mod appwrite_client;
pub mod auth;
pub mod backend;
pub mod certificate;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod roster;
pub mod server;
pub mod spreadsheet;
pub mod state;
pub mod templates;
// re-export items if you prefer a flat structure:
pub use db::CertGenDb;
pub use error::Result as AppResult;
pub use state::AdminStateManager;
