//! Common items that you will always want in scope when generating a CMS schema.

pub use crate::{
    backend::{DataSource, RequestContext},
    blocks::{kinds::*, Block, Chooser, DescribeBlock, ScalarKind, StreamBlock, StructBlock},
    catalog::{Catalog, ModelDescriptor, ModelId},
    config::ApiSettings,
    content::{Instance, Site, User},
    error::{Error, Result},
    schema::{CmsSchema, SchemaBuilder},
};
pub use async_graphql;
