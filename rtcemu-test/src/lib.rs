//! Test harness for rtcemu labs on a real kernel.
//!
//! - [`lab::TestLab`] - a lab with its own bridge, subnet and state file that
//!   is torn down when dropped, even if the test panics
//! - [`lab::skip_without_privileges`] - skip cleanly on hosts that can't run it
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use rtcemu_test::lab::{skip_without_privileges, TestLab};
//!
//! #[tokio::test]
//! async fn test_two_nodes() {
//!     if skip_without_privileges() {
//!         return;
//!     }
//!     let mut lab = TestLab::new().unwrap();
//!     let created = lab.create(2).await.unwrap();
//!     assert_eq!(created.nodes.len(), 2);
//! }
//! ```

pub mod lab;
