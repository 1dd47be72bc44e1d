//! Integration Test Harness
//!
//! - `ThemedTest` - Runs a themed server in-process on a random port, with
//!   built-in themes and state in a temp directory
//! - `BinaryServer` - Spawns the real `themed` binary with CLI flags
//! - `RemoteFixture` - Stand-in for the remote index, bundle host and
//!   preview host, including flaky and failing routes
//!
//! # Example
//!
//! ```rust,ignore
//! use harness::ThemedTest;
//!
//! #[tokio::test]
//! async fn test_switch_theme() {
//!     let themed = ThemedTest::start().await.unwrap();
//!     let resp = themed.put("/themes/current", &json!({"name": "nord"})).await.unwrap();
//!     assert_eq!(resp.status(), 200);
//! }
//! ```

#![allow(dead_code)]

mod remote;
mod server;

pub use remote::{RemoteFixture, NEON_PREVIEW};
pub use server::{BinaryServer, ThemedTest};
