//! The page interface and the page tree queries.

use super::relay::{self, ConnectionArgs};
use super::resolve::{page_value, Resolved};
use super::{request_context, Services, FORMAT_VERSION};
use crate::backend::{DataSource, PageQuery, RequestContext, Revision};
use crate::content::{Page, Site, User};
use crate::permissions::visible_pages;
use crate::registry::Registry;
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Interface, InterfaceField, Object,
    ResolverContext, TypeRef,
};
use async_graphql::{SelectionField, Value as GqlValue};
use chrono::{DateTime, Utc};
use convert_case::{Case, Casing};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{trace, warn};

/// The name of the interface implemented by every page type.
pub const PAGE_INTERFACE: &str = "PageInterface";

/// Plain attributes of the page interface: name, GraphQL type and nullability.
const ATTRIBUTES: &[(&str, &str, bool)] = &[
    ("title", TypeRef::STRING, true),
    ("slug", TypeRef::STRING, true),
    ("contentType", TypeRef::STRING, true),
    ("path", TypeRef::STRING, true),
    ("depth", TypeRef::INT, true),
    ("numchild", TypeRef::INT, true),
    ("seoTitle", TypeRef::STRING, true),
    ("draftTitle", TypeRef::STRING, true),
    ("live", TypeRef::BOOLEAN, true),
    ("showInMenus", TypeRef::BOOLEAN, true),
    ("expired", TypeRef::BOOLEAN, true),
    ("locked", TypeRef::BOOLEAN, true),
    ("hasUnpublishedChanges", TypeRef::BOOLEAN, true),
    ("revision", TypeRef::INT, false),
    ("firstPublishedAt", "DateTime", false),
    ("lastPublishedAt", "DateTime", false),
    ("latestRevisionCreatedAt", "DateTime", false),
    ("goLiveAt", "DateTime", false),
    ("expireAt", "DateTime", false),
];

/// Every field of the page interface. Page models may not declare fields with these names.
pub(crate) const PAGE_FIELDS: &[&str] = &[
    "id",
    "urlPath",
    "children",
    "title",
    "slug",
    "contentType",
    "path",
    "depth",
    "numchild",
    "seoTitle",
    "draftTitle",
    "live",
    "showInMenus",
    "expired",
    "locked",
    "hasUnpublishedChanges",
    "revision",
    "firstPublishedAt",
    "lastPublishedAt",
    "latestRevisionCreatedAt",
    "goLiveAt",
    "expireAt",
];

pub(crate) fn datetime(value: Option<DateTime<Utc>>) -> GqlValue {
    value
        .map(|dt| GqlValue::String(dt.to_rfc3339()))
        .unwrap_or(GqlValue::Null)
}

fn attribute(page: &Page, field: &str) -> GqlValue {
    match field {
        "title" => page.title.clone().into(),
        "slug" => page.slug.clone().into(),
        "contentType" => page.model().to_string().into(),
        "path" => page.path.clone().into(),
        "depth" => page.depth.into(),
        "numchild" => page.numchild.into(),
        "seoTitle" => page.seo_title.clone().into(),
        "draftTitle" => page.draft_title.clone().into(),
        "live" => page.live.into(),
        "showInMenus" => page.show_in_menus.into(),
        "expired" => page.expired.into(),
        "locked" => page.locked.into(),
        "hasUnpublishedChanges" => page.has_unpublished_changes.into(),
        "revision" => page.revision.map(GqlValue::from).unwrap_or(GqlValue::Null),
        "firstPublishedAt" => datetime(page.first_published_at),
        "lastPublishedAt" => datetime(page.last_published_at),
        "latestRevisionCreatedAt" => datetime(page.latest_revision_created_at),
        "goLiveAt" => datetime(page.go_live_at),
        "expireAt" => datetime(page.expire_at),
        _ => GqlValue::Null,
    }
}

fn attribute_type(ty: &str, non_null: bool) -> TypeRef {
    if non_null {
        TypeRef::named_nn(ty)
    } else {
        TypeRef::named(ty)
    }
}

/// The URL path of a page as exposed to clients: with the site's URL prefix and any trailing slash
/// removed.
pub(crate) fn public_url_path(url_path: &str, prefix: &str) -> String {
    let path = url_path.strip_prefix(prefix).unwrap_or(url_path);
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        "/".into()
    } else if path.starts_with('/') {
        path.into()
    } else {
        format!("/{path}")
    }
}

/// The stored URL path of the page a client asked for by URL.
pub(crate) fn stored_url_path(url: &str, prefix: &str) -> String {
    let url = url.trim_matches('/');
    if url.is_empty() {
        format!("{prefix}/")
    } else {
        format!("{prefix}/{url}/")
    }
}

/// The URL prefix configured for the site of `request`.
pub(crate) fn url_prefix<D>(services: &Services<D>, request: &RequestContext) -> String {
    let host = request
        .site
        .as_ref()
        .map(|site| site.hostname.as_str())
        .unwrap_or_default();
    services
        .settings
        .url_prefix
        .for_host(host)
        .trim_end_matches('/')
        .to_string()
}

fn id_type(relay: bool) -> TypeRef {
    if relay {
        TypeRef::named_nn(TypeRef::ID)
    } else {
        TypeRef::named_nn(TypeRef::INT)
    }
}

fn children_type(relay: bool) -> TypeRef {
    if relay {
        TypeRef::named_nn(relay::PAGE_CONNECTION)
    } else {
        TypeRef::named_list(PAGE_INTERFACE)
    }
}

/// The page interface.
pub(crate) fn interface(relay: bool) -> Interface {
    let mut interface = Interface::new(PAGE_INTERFACE)
        .description("A page in the page tree.")
        .field(InterfaceField::new("id", id_type(relay)))
        .field(InterfaceField::new("urlPath", TypeRef::named_nn(TypeRef::STRING)));
    let mut children = InterfaceField::new("children", children_type(relay));
    if relay {
        children = relay::interface_arguments(children);
    }
    interface = interface.field(children);
    for (name, ty, non_null) in ATTRIBUTES {
        interface = interface.field(InterfaceField::new(*name, attribute_type(ty, *non_null)));
    }
    interface
}

/// Add the fields of the page interface to the object type `object`.
pub(crate) fn implement<D: DataSource>(services: &Arc<Services<D>>, mut object: Object) -> Object {
    let relay = services.settings.relay;
    let type_name = object.type_name().to_string();
    object = object.implement(PAGE_INTERFACE);
    if relay {
        object = object.implement(relay::NODE);
    }

    object = object.field(Field::new("id", id_type(relay), move |ctx| {
        let type_name = type_name.clone();
        FieldFuture::new(async move {
            let page = ctx.parent_value.try_downcast_ref::<Page>()?;
            Ok(Some(if relay {
                FieldValue::value(relay::global_id(&type_name, page.id))
            } else {
                FieldValue::value(page.id)
            }))
        })
    }));

    let svc = services.clone();
    object = object.field(Field::new(
        "urlPath",
        TypeRef::named_nn(TypeRef::STRING),
        move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let page = ctx.parent_value.try_downcast_ref::<Page>()?;
                let prefix = url_prefix(&services, &request_context(&ctx));
                Ok(Some(FieldValue::value(public_url_path(&page.url_path, &prefix))))
            })
        },
    ));

    let svc = services.clone();
    let mut children = Field::new("children", children_type(relay), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let page = ctx.parent_value.try_downcast_ref::<Page>()?;
            let request = request_context(&ctx);
            let query = PageQuery::all().child_of(page).live().order_by_path();
            let children = visible_pages(&*services.db, &request, query).await?;
            page_list(&services, &ctx, children)
        })
    })
    .description("The live children of the page visible to the user, in tree order.");
    if relay {
        children = relay::arguments(children);
    }
    object = object.field(children);

    for (name, ty, non_null) in ATTRIBUTES {
        object = object.field(Field::new(*name, attribute_type(ty, *non_null), move |ctx| {
            FieldFuture::new(async move {
                let page = ctx.parent_value.try_downcast_ref::<Page>()?;
                Ok(Some(FieldValue::value(attribute(page, name))))
            })
        }));
    }
    object
}

/// Convert a list of pages to the value of a field returning pages.
///
/// In relay mode this is a connection sliced according to the field's pagination arguments.
/// Pages of models which are not exposed in the schema are skipped.
pub(crate) fn page_list<'a, D>(
    services: &Services<D>,
    ctx: &ResolverContext,
    pages: Vec<Page>,
) -> Resolved<'a> {
    let registry = &services.registry;
    let pages = pages
        .into_iter()
        .filter(|page| {
            let exposed = registry.page_type(page.model()).is_ok();
            if !exposed {
                warn!(page = page.id, model = %page.model(), "skipping page of unexposed model");
            }
            exposed
        })
        .collect::<Vec<_>>();
    if services.settings.relay {
        let args = ConnectionArgs::from_args(ctx)?;
        return Ok(Some(FieldValue::owned_any(relay::connection(pages, &args))));
    }
    let pages = pages.into_iter().filter_map(|page| page_value(registry, page));
    Ok(Some(FieldValue::list(pages)))
}

/// The names of the fields selected on the pages returned by `field`, looking through relay
/// connections.
fn selected_page_fields(field: SelectionField) -> Vec<String> {
    let mut names = vec![];
    for child in field.selection_set() {
        match child.name() {
            "edges" => {
                for edge in child.selection_set().filter(|f| f.name() == "node") {
                    names.extend(edge.selection_set().map(|f| f.name().to_string()));
                }
            }
            name => names.push(name.to_string()),
        }
    }
    names
}

/// The relations worth loading eagerly for a query selecting `selected` fields of pages.
pub(crate) fn prefetch_hints<I>(registry: &Registry, selected: I) -> BTreeSet<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    selected
        .into_iter()
        .map(|name| name.as_ref().to_case(Case::Snake))
        .filter(|name| registry.page_prefetch_fields().contains(name))
        .collect()
}

fn user_type() -> Object {
    let mut object = Object::new("User").description("A user of the CMS.");
    for (name, ty) in [
        ("id", TypeRef::named_nn(TypeRef::INT)),
        ("username", TypeRef::named_nn(TypeRef::STRING)),
        ("firstName", TypeRef::named_nn(TypeRef::STRING)),
        ("lastName", TypeRef::named_nn(TypeRef::STRING)),
        ("email", TypeRef::named_nn(TypeRef::STRING)),
        ("isSuperuser", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("isStaff", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("isActive", TypeRef::named_nn(TypeRef::BOOLEAN)),
        ("groups", TypeRef::named_nn_list_nn(TypeRef::STRING)),
    ] {
        object = object.field(Field::new(name, ty, move |ctx| {
            FieldFuture::new(async move {
                let user = ctx.parent_value.try_downcast_ref::<User>()?;
                let value: GqlValue = match name {
                    "id" => user.id.into(),
                    "username" => user.username.clone().into(),
                    "firstName" => user.first_name.clone().into(),
                    "lastName" => user.last_name.clone().into(),
                    "email" => user.email.clone().into(),
                    "isSuperuser" => user.is_superuser.into(),
                    "isStaff" => user.is_staff.into(),
                    "isActive" => user.is_active.into(),
                    _ => GqlValue::List(user.groups.iter().cloned().map(GqlValue::from).collect()),
                };
                Ok(Some(FieldValue::value(value)))
            })
        }));
    }
    object
}

fn site_type<D: DataSource>(services: &Arc<Services<D>>) -> Object {
    let mut object = Object::new("Site").description("A site served by the CMS.");
    for (name, ty) in [
        ("id", TypeRef::named_nn(TypeRef::INT)),
        ("hostname", TypeRef::named_nn(TypeRef::STRING)),
        ("port", TypeRef::named_nn(TypeRef::INT)),
        ("siteName", TypeRef::named_nn(TypeRef::STRING)),
        ("isDefaultSite", TypeRef::named_nn(TypeRef::BOOLEAN)),
    ] {
        object = object.field(Field::new(name, ty, move |ctx| {
            FieldFuture::new(async move {
                let site = ctx.parent_value.try_downcast_ref::<Site>()?;
                let value: GqlValue = match name {
                    "id" => site.id.into(),
                    "hostname" => site.hostname.clone().into(),
                    "port" => site.port.into(),
                    "siteName" => site.site_name.clone().into(),
                    _ => site.is_default_site.into(),
                };
                Ok(Some(FieldValue::value(value)))
            })
        }));
    }

    let svc = services.clone();
    object.field(Field::new(
        "rootPage",
        TypeRef::named(PAGE_INTERFACE),
        move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let site = ctx.parent_value.try_downcast_ref::<Site>()?;
                let request = request_context(&ctx);
                let pages =
                    visible_pages(&*services.db, &request, PageQuery::all().id(site.root_page))
                        .await?;
                Ok(pages
                    .into_iter()
                    .next()
                    .and_then(|page| page_value(&services.registry, page)))
            })
        },
    ))
}

/// The fixed object types related to pages.
pub(crate) fn types<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Object> {
    vec![user_type(), site_type(services)]
}

/// The page tree fields of the root query.
pub(crate) fn query_fields<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Field> {
    let relay = services.settings.relay;
    let mut fields = vec![];

    fields.push(
        Field::new("format", TypeRef::named_nn(TypeRef::STRING), |_| {
            FieldFuture::from_value(Some(GqlValue::from(FORMAT_VERSION)))
        })
        .description("The version of the API."),
    );

    fields.push(
        Field::new("user", TypeRef::named_nn("User"), |ctx| {
            FieldFuture::new(async move {
                let user = request_context(&ctx).user.unwrap_or_else(User::anonymous);
                Ok(Some(FieldValue::owned_any(user)))
            })
        })
        .description("The logged-in user, or an anonymous user with ID -1."),
    );

    fields.push(
        Field::new("root", TypeRef::named("Site"), |ctx| {
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                if !request.is_superuser() {
                    return Ok(None);
                }
                Ok(request.site.map(FieldValue::owned_any))
            })
        })
        .description("The current site. Only available to superusers."),
    );

    let svc = services.clone();
    fields.push(
        Field::new("page", TypeRef::named(PAGE_INTERFACE), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let id = ctx.args.get("id").map(|v| v.i64()).transpose()?;
                let url = ctx
                    .args
                    .get("url")
                    .map(|v| v.string().map(String::from))
                    .transpose()?;
                let revision = ctx.args.get("revision").map(|v| v.i64()).transpose()?;

                let query = match (id, url) {
                    (Some(id), _) => PageQuery::all().id(id),
                    (None, Some(url)) => PageQuery::all()
                        .url_path(stored_url_path(&url, &url_prefix(&services, &request))),
                    (None, None) => return Err("One of 'id' or 'url' must be specified".into()),
                };
                let Some(page) = visible_pages(&*services.db, &request, query)
                    .await?
                    .into_iter()
                    .next()
                else {
                    return Ok(None);
                };

                let page = match revision {
                    Some(revision) => services
                        .db
                        .page_revision(&page, Revision::from(revision))
                        .await?
                        .ok_or_else(|| format!("Revision {revision} doesn't exist"))?,
                    None => page,
                };
                trace!(page = page.id, revision = ?page.revision, "resolved page");
                Ok(page_value(&services.registry, page))
            })
        })
        .argument(InputValue::new("id", TypeRef::named(TypeRef::INT)))
        .argument(InputValue::new("url", TypeRef::named(TypeRef::STRING)))
        .argument(
            InputValue::new("revision", TypeRef::named(TypeRef::INT))
                .description("A revision ID, or -1 for the latest revision."),
        )
        .description("Look up a page by ID or URL."),
    );

    let svc = services.clone();
    let mut pages = Field::new("pages", children_type(relay), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let request = request_context(&ctx);
            let hints = prefetch_hints(&services.registry, selected_page_fields(ctx.ctx.field()));
            let mut query = PageQuery::all().live().order_by_path().select_related(hints);

            if let Some(parent) = ctx.args.get("parent").map(|v| v.i64()).transpose()? {
                let parent_page = visible_pages(&*services.db, &request, PageQuery::all().id(parent))
                    .await?
                    .into_iter()
                    .next()
                    .ok_or_else(|| format!("Page id={parent} not found."))?;
                query = query.child_of(&parent_page);
            }
            let pages = visible_pages(&*services.db, &request, query).await?;
            page_list(&services, &ctx, pages)
        })
    })
    .argument(InputValue::new("parent", TypeRef::named(TypeRef::INT)))
    .description("Live pages visible to the user, optionally only the children of `parent`.");
    if relay {
        pages = relay::arguments(pages);
    }
    fields.push(pages);

    let svc = services.clone();
    fields.push(
        Field::new("showInMenus", TypeRef::named_list(PAGE_INTERFACE), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let query = PageQuery::all().live().in_menus().order_by_path();
                let pages = visible_pages(&*services.db, &request, query).await?;
                let pages = pages
                    .into_iter()
                    .filter_map(|page| page_value(&services.registry, page));
                Ok(Some(FieldValue::list(pages)))
            })
        })
        .description("Live pages visible to the user which are flagged for display in menus."),
    );

    fields
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::catalog::ModelId;
    use crate::registry::Entry;
    use crate::schema::types::{TypeDef, TypeSource};

    #[test]
    fn test_url_paths() {
        assert_eq!(public_url_path("/home/about/", "/home"), "/about");
        assert_eq!(public_url_path("/home/", "/home"), "/");
        assert_eq!(public_url_path("/about/", ""), "/about");
        assert_eq!(public_url_path("/other/about/", "/home"), "/other/about");

        assert_eq!(stored_url_path("/about", "/home"), "/home/about/");
        assert_eq!(stored_url_path("about/", "/home"), "/home/about/");
        assert_eq!(stored_url_path("/", "/home"), "/home/");
        assert_eq!(stored_url_path("/", ""), "/");
    }

    #[test]
    fn test_prefetch_hints() {
        let mut registry = Registry::default();
        let model = ModelId::new("blog", "BlogPage");
        registry
            .register(Entry::Page {
                ty: Arc::new(TypeDef::new("BlogBlogPage", TypeSource::Model(model.clone()))),
                model,
            })
            .unwrap();
        registry.add_prefetch_field("blogpage");

        let hints = prefetch_hints(&registry, ["contentType", "title", "owner", "blogpage"]);
        assert_eq!(
            hints,
            ["blogpage", "content_type", "owner"]
                .into_iter()
                .map(String::from)
                .collect::<BTreeSet<_>>()
        );
    }

    #[test]
    fn test_attributes_are_page_fields() {
        for (name, _, _) in ATTRIBUTES {
            assert!(PAGE_FIELDS.contains(name), "{name}");
        }
        assert_eq!(PAGE_FIELDS.len(), ATTRIBUTES.len() + 3);
    }
}
