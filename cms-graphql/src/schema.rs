//! Generation and execution of the CMS schema.
//!
//! Building a schema is a two step process. First, a [`SchemaBuilder`] is filled in by
//! [registering](SchemaBuilder::register_application) the applications whose models should be
//! exposed. This walks the [`Catalog`](crate::catalog::Catalog), classifies each model and
//! synthesizes a description of a GraphQL type for it, recursing into the block trees of its
//! stream fields. Then [`finish`](SchemaBuilder::finish) freezes the [`Registry`] of generated
//! types and assembles it, along with the fixed types every CMS schema has (pages, images,
//! documents, menus, users and so on), into an executable [`CmsSchema`].
//!
//! The in-memory data source used below requires the `mocks` feature.
//!
//! ```
//! # #[cfg(feature = "mocks")]
//! # async_std::task::block_on(async {
//! use cms_graphql::{
//!     backend::{mock::InMemoryDataSource, RequestContext},
//!     catalog::{Catalog, ModelDescriptor},
//!     config::ApiSettings,
//!     content::Site,
//!     schema::SchemaBuilder,
//! };
//!
//! let catalog = Catalog::default().with_model(ModelDescriptor::page("home", "HomePage"));
//! let mut builder = SchemaBuilder::new(ApiSettings::default().with_apps(["home"]));
//! builder.register_applications(&catalog).unwrap();
//! let schema = builder.finish(InMemoryDataSource::create()).unwrap();
//!
//! let site = Site::new(1, "localhost", 2, "00010001");
//! let res = schema.execute("{ format }", RequestContext::anonymous(site)).await;
//! assert_eq!(res.data.into_json().unwrap()["format"], "0.2.0");
//! # });
//! ```

use crate::backend::{DataSource, RequestContext};
use crate::config::ApiSettings;
use crate::error::{Error, Result};
use crate::registry::Registry;
use async_graphql::dynamic::{ResolverContext, Schema};
use async_graphql::{Request, Response};
use std::sync::Arc;
use tracing::info;

mod assembly;
mod forms;
mod media;
mod menus;
mod models;
mod pages;
mod relay;
mod resolve;
mod scalars;
mod snippets;
pub mod streamfield;
pub mod types;

pub use forms::{validate_submission, FieldError};
pub use models::{capfirst, format_prefix};
pub use pages::PAGE_INTERFACE;
pub use relay::{decode_global_id, global_id};
pub use resolve::BlockValue;

/// The version of the API exposed by generated schemas.
pub const FORMAT_VERSION: &str = "0.2.0";

/// The build context for a CMS schema.
#[derive(Clone, Debug, Default)]
pub struct SchemaBuilder {
    registry: Registry,
    settings: ApiSettings,
}

impl SchemaBuilder {
    pub fn new(settings: ApiSettings) -> Self {
        Self {
            registry: Registry::default(),
            settings,
        }
    }

    /// The types generated so far.
    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn settings(&self) -> &ApiSettings {
        &self.settings
    }

    /// Assemble the registered types into an executable schema backed by `db`.
    pub fn finish<D: DataSource>(self, db: D) -> Result<CmsSchema<D>> {
        let services = Arc::new(Services {
            registry: Arc::new(self.registry),
            db: Arc::new(db),
            settings: self.settings,
        });
        let schema = assembly::build(&services).map_err(|err| Error::Schema {
            error: err.to_string(),
        })?;
        info!(
            types = services.registry.types().count(),
            unions = services.registry.unions().len(),
            "built schema"
        );
        Ok(CmsSchema { schema, services })
    }
}

/// Shared state captured by every resolver in a generated schema.
pub(crate) struct Services<D> {
    pub registry: Arc<Registry>,
    pub db: Arc<D>,
    pub settings: ApiSettings,
}

/// An executable schema generated from a catalog.
///
/// The schema is immutable and can be shared between threads; queries may be executed
/// concurrently.
pub struct CmsSchema<D> {
    schema: Schema,
    services: Arc<Services<D>>,
}

impl<D: DataSource> CmsSchema<D> {
    /// Execute a query or mutation on behalf of the user and site described by `ctx`.
    pub async fn execute(&self, request: impl Into<Request>, ctx: RequestContext) -> Response {
        self.schema.execute(request.into().data(ctx)).await
    }

    /// The schema in GraphQL schema definition language.
    pub fn sdl(&self) -> String {
        self.schema.sdl()
    }

    pub fn registry(&self) -> &Registry {
        &self.services.registry
    }

    pub fn data_source(&self) -> &D {
        &self.services.db
    }

    /// The underlying dynamic schema.
    pub fn inner(&self) -> &Schema {
        &self.schema
    }
}

/// The request context attached to a query, or an empty context with no site, in which no
/// content is visible.
pub(crate) fn request_context(ctx: &ResolverContext) -> RequestContext {
    ctx.data_opt::<RequestContext>().cloned().unwrap_or_default()
}
