//! Jira and Confluence REST clients used for post-incident documentation.

mod client;

pub use client::{AtlassianClient, AtlassianConfig, ConfluencePageRef, JiraIssueRef};
