//! CMS GraphQL generates a GraphQL API from the content models of a page-tree CMS. It consists of
//! three sections:
//!
//! * A [catalog], which describes the content models of the CMS: pages, forms, snippets, settings
//!   and the [blocks] that make up their stream fields.
//! * A [schema] generator, which walks the catalog, synthesizes a GraphQL type for every exposed
//!   model and block, and assembles them, along with fixed types for pages, media, menus and
//!   users, into an executable schema. The generated types are recorded in a [registry] which
//!   resolvers consult at query time.
//! * A [backend], which abstracts the content store. Resolvers load content through the
//!   [`DataSource`](backend::DataSource) trait, filtered by the [permissions] of the requesting
//!   user. The crate comes with an in-memory data source, which is useful for lightweight testing.

use std::sync::Once;
use tracing_subscriber::EnvFilter;

extern crate self as cms_graphql;

pub mod backend;
pub mod blocks;
pub mod catalog;
pub mod config;
pub mod content;
pub mod error;
pub mod permissions;
pub mod prelude;
pub mod registry;
pub mod schema;

/// Initialize tracing.
pub fn init_logging() {
    static ONCE: Once = Once::new();

    ONCE.call_once(|| {
        if let Err(err) = color_eyre::install() {
            eprintln!("failed to install error report handler: {err}");
        }
        tracing_subscriber::fmt()
            .with_ansi(true)
            .with_env_filter(EnvFilter::from_default_env())
            .init();
    });
}
