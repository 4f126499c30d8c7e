//! Relay global object identification and cursor connections.
//!
//! When relay mode is enabled, pages are identified by opaque global IDs which encode both the
//! page's concrete type and its primary key, any page can be fetched with the `node` query, and
//! lists of pages are exposed as connections paginated by cursors. Cursors encode an offset into
//! the full list, in the same format as the reference Relay server implementation.

use super::pages::PAGE_INTERFACE;
use super::resolve::page_value;
use super::{request_context, Services};
use crate::backend::{DataSource, PageQuery};
use crate::content::{Id, Page};
use crate::permissions::visible_pages;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Interface, InterfaceField, Object,
    ResolverContext, TypeRef,
};
use base64::prelude::*;
use std::ops::Range;
use std::sync::Arc;

/// The name of the interface implemented by objects with global IDs.
pub const NODE: &str = "Node";
pub(crate) const PAGE_CONNECTION: &str = "PageConnection";
const PAGE_EDGE: &str = "PageEdge";
const PAGE_INFO: &str = "PageInfo";
const CURSOR_PREFIX: &str = "arrayconnection:";

/// The global ID of the object of type `type_name` with primary key `id`.
pub fn global_id(type_name: &str, id: Id) -> String {
    BASE64_STANDARD.encode(format!("{type_name}:{id}"))
}

/// Split a global ID into a type name and primary key.
pub fn decode_global_id(global_id: &str) -> Option<(String, Id)> {
    let decoded = String::from_utf8(BASE64_STANDARD.decode(global_id).ok()?).ok()?;
    let (type_name, id) = decoded.rsplit_once(':')?;
    Some((type_name.to_string(), id.parse().ok()?))
}

fn cursor(offset: usize) -> String {
    BASE64_STANDARD.encode(format!("{CURSOR_PREFIX}{offset}"))
}

fn decode_cursor(cursor: &str) -> async_graphql::Result<usize> {
    let invalid = || async_graphql::Error::new(format!("invalid cursor {cursor:?}"));
    let decoded = BASE64_STANDARD.decode(cursor).map_err(|_| invalid())?;
    let decoded = String::from_utf8(decoded).map_err(|_| invalid())?;
    decoded
        .strip_prefix(CURSOR_PREFIX)
        .and_then(|offset| offset.parse().ok())
        .ok_or_else(invalid)
}

/// Pagination arguments of a connection field.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct ConnectionArgs {
    pub first: Option<usize>,
    pub after: Option<usize>,
    pub last: Option<usize>,
    pub before: Option<usize>,
}

impl ConnectionArgs {
    pub fn from_args(ctx: &ResolverContext) -> async_graphql::Result<Self> {
        let count = |name: &str| -> async_graphql::Result<Option<usize>> {
            match ctx.args.get(name) {
                Some(value) => {
                    let n = value.i64()?;
                    usize::try_from(n)
                        .map(Some)
                        .map_err(|_| format!("`{name}` must not be negative").into())
                }
                None => Ok(None),
            }
        };
        let cursor = |name: &str| -> async_graphql::Result<Option<usize>> {
            ctx.args
                .get(name)
                .map(|value| decode_cursor(value.string()?))
                .transpose()
        };
        Ok(Self {
            first: count("first")?,
            after: cursor("after")?,
            last: count("last")?,
            before: cursor("before")?,
        })
    }

    /// The range of a list of `len` items selected by these arguments.
    ///
    /// Items strictly between the `after` and `before` cursors are selected, then limited to the
    /// `first` of those, then to the `last` of what remains.
    pub fn slice(&self, len: usize) -> Range<usize> {
        let start = self.after.map(|after| after.saturating_add(1)).unwrap_or(0).min(len);
        let end = self.before.unwrap_or(len).min(len).max(start);
        let end = match self.first {
            Some(first) => end.min(start.saturating_add(first)),
            None => end,
        };
        let start = match self.last {
            Some(last) => start.max(end.saturating_sub(last)),
            None => start,
        };
        start..end
    }
}

/// A page of a connection to pages.
#[derive(Clone, Debug)]
pub(crate) struct PageConnection {
    edges: Vec<PageEdge>,
    page_info: PageInfo,
}

#[derive(Clone, Debug)]
struct PageEdge {
    offset: usize,
    page: Page,
}

#[derive(Clone, Debug)]
struct PageInfo {
    has_next_page: bool,
    has_previous_page: bool,
    start_cursor: Option<String>,
    end_cursor: Option<String>,
}

/// Select the page of `pages` requested by `args`.
pub(crate) fn connection(pages: Vec<Page>, args: &ConnectionArgs) -> PageConnection {
    let len = pages.len();
    let range = args.slice(len);
    let page_info = PageInfo {
        has_next_page: range.end < len,
        has_previous_page: range.start > 0,
        start_cursor: (!range.is_empty()).then(|| cursor(range.start)),
        end_cursor: (!range.is_empty()).then(|| cursor(range.end - 1)),
    };
    let edges = pages
        .into_iter()
        .enumerate()
        .skip(range.start)
        .take(range.len())
        .map(|(offset, page)| PageEdge { offset, page })
        .collect();
    PageConnection { edges, page_info }
}

/// Add pagination arguments to a connection field.
pub(crate) fn arguments(field: Field) -> Field {
    field
        .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
        .argument(InputValue::new("last", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("before", TypeRef::named(TypeRef::STRING)))
}

/// Add pagination arguments to a connection field of an interface.
pub(crate) fn interface_arguments(field: InterfaceField) -> InterfaceField {
    field
        .argument(InputValue::new("first", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("after", TypeRef::named(TypeRef::STRING)))
        .argument(InputValue::new("last", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("before", TypeRef::named(TypeRef::STRING)))
}

pub(crate) fn node_interface() -> Interface {
    Interface::new(NODE)
        .description("An object with a global ID.")
        .field(InterfaceField::new("id", TypeRef::named_nn(TypeRef::ID)))
}

/// The connection, edge and page info types.
pub(crate) fn types<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Object> {
    let page_info = Object::new(PAGE_INFO)
        .field(Field::new(
            "hasNextPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |ctx| {
                FieldFuture::new(async move {
                    let info = ctx.parent_value.try_downcast_ref::<PageInfo>()?;
                    Ok(Some(FieldValue::value(info.has_next_page)))
                })
            },
        ))
        .field(Field::new(
            "hasPreviousPage",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |ctx| {
                FieldFuture::new(async move {
                    let info = ctx.parent_value.try_downcast_ref::<PageInfo>()?;
                    Ok(Some(FieldValue::value(info.has_previous_page)))
                })
            },
        ))
        .field(Field::new("startCursor", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let info = ctx.parent_value.try_downcast_ref::<PageInfo>()?;
                Ok(info.start_cursor.clone().map(FieldValue::value))
            })
        }))
        .field(Field::new("endCursor", TypeRef::named(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let info = ctx.parent_value.try_downcast_ref::<PageInfo>()?;
                Ok(info.end_cursor.clone().map(FieldValue::value))
            })
        }));

    let svc = services.clone();
    let edge = Object::new(PAGE_EDGE)
        .field(Field::new("cursor", TypeRef::named_nn(TypeRef::STRING), |ctx| {
            FieldFuture::new(async move {
                let edge = ctx.parent_value.try_downcast_ref::<PageEdge>()?;
                Ok(Some(FieldValue::value(cursor(edge.offset))))
            })
        }))
        .field(Field::new(
            "node",
            TypeRef::named_nn(PAGE_INTERFACE),
            move |ctx| {
                let services = svc.clone();
                FieldFuture::new(async move {
                    let edge = ctx.parent_value.try_downcast_ref::<PageEdge>()?;
                    Ok(page_value(&services.registry, edge.page.clone()))
                })
            },
        ));

    let connection = Object::new(PAGE_CONNECTION)
        .field(Field::new(
            "edges",
            TypeRef::named_nn_list_nn(PAGE_EDGE),
            |ctx| {
                FieldFuture::new(async move {
                    let conn = ctx.parent_value.try_downcast_ref::<PageConnection>()?;
                    Ok(Some(FieldValue::list(
                        conn.edges.iter().cloned().map(FieldValue::owned_any),
                    )))
                })
            },
        ))
        .field(Field::new(
            "pageInfo",
            TypeRef::named_nn(PAGE_INFO),
            |ctx| {
                FieldFuture::new(async move {
                    let conn = ctx.parent_value.try_downcast_ref::<PageConnection>()?;
                    Ok(Some(FieldValue::owned_any(conn.page_info.clone())))
                })
            },
        ));

    vec![page_info, edge, connection]
}

/// The `node` query, which fetches a page by global ID.
pub(crate) fn node_field<D: DataSource>(services: &Arc<Services<D>>) -> Field {
    let svc = services.clone();
    Field::new("node", TypeRef::named(NODE), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let id = ctx.args.try_get("id")?.string()?.to_string();
            let Some((type_name, id)) = decode_global_id(&id) else {
                return Err(format!("invalid global ID {id:?}").into());
            };
            let request = request_context(&ctx);
            let page = visible_pages(&*services.db, &request, PageQuery::all().id(id))
                .await?
                .into_iter()
                .next();
            // The ID must name the page's actual type.
            let page = page.filter(|page| {
                services
                    .registry
                    .page_type(page.model())
                    .map(|ty| ty.name == type_name)
                    .unwrap_or(false)
            });
            Ok(page.and_then(|page| page_value(&services.registry, page)))
        })
    })
    .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::ID)))
    .description("Look up a page by global ID.")
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ModelId;
    use proptest::{prelude::*, test_runner::Config};

    #[test]
    fn test_global_ids() {
        let id = global_id("HomeHomePage", 42);
        assert_eq!(decode_global_id(&id), Some(("HomeHomePage".into(), 42)));
        assert_eq!(decode_global_id("not base64!"), None);
        assert_eq!(decode_global_id(&BASE64_STANDARD.encode("no-id")), None);
    }

    #[test]
    fn test_cursors() {
        assert_eq!(cursor(0), "YXJyYXljb25uZWN0aW9uOjA=");
        assert_eq!(decode_cursor(&cursor(17)).unwrap(), 17);
        assert!(decode_cursor(&BASE64_STANDARD.encode("offset:1")).is_err());
    }

    #[test]
    fn test_connection() {
        let model = ModelId::new("home", "HomePage");
        let pages = (0..5)
            .map(|i| Page::new(i, model.clone(), format!("0001{:04}", i), format!("Page {i}")))
            .collect::<Vec<_>>();
        let conn = connection(
            pages,
            &ConnectionArgs {
                first: Some(2),
                after: Some(0),
                ..Default::default()
            },
        );
        assert_eq!(
            conn.edges.iter().map(|e| e.page.id).collect::<Vec<_>>(),
            [1, 2]
        );
        assert!(conn.page_info.has_next_page);
        assert!(conn.page_info.has_previous_page);
        assert_eq!(conn.page_info.start_cursor, Some(cursor(1)));
        assert_eq!(conn.page_info.end_cursor, Some(cursor(2)));
    }

    #[test]
    fn test_empty_connection() {
        let conn = connection(vec![], &ConnectionArgs::default());
        assert!(conn.edges.is_empty());
        assert!(!conn.page_info.has_next_page);
        assert_eq!(conn.page_info.start_cursor, None);
    }

    #[test]
    fn test_slice_extreme_arguments() {
        let after = decode_cursor(&cursor(usize::MAX)).unwrap();
        let args = ConnectionArgs {
            after: Some(after),
            ..Default::default()
        };
        assert_eq!(args.slice(3), 3..3);

        let args = ConnectionArgs {
            first: Some(usize::MAX),
            after: Some(0),
            before: Some(usize::MAX),
            last: Some(usize::MAX),
        };
        assert_eq!(args.slice(3), 1..3);
    }

    proptest! {
        #![proptest_config(Config {
            cases: 256,
            ..Default::default()
        })]

        #[test]
        fn test_slice_bounds(
            len in 0..20usize,
            first in proptest::option::of(0..25usize),
            after in proptest::option::of(0..25usize),
            last in proptest::option::of(0..25usize),
            before in proptest::option::of(0..25usize),
        ) {
            let args = ConnectionArgs { first, after, last, before };
            let range = args.slice(len);
            prop_assert!(range.start <= range.end);
            prop_assert!(range.end <= len);
            if let Some(after) = after {
                prop_assert!(range.is_empty() || range.start > after);
            }
            if let Some(before) = before {
                prop_assert!(range.end <= before.max(range.start));
            }
            if let Some(first) = first {
                prop_assert!(range.len() <= first);
            }
            if let Some(last) = last {
                prop_assert!(range.len() <= last);
            }
        }
    }
}
