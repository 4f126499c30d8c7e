//! Navigation menus.
//!
//! Every site has a main menu and any number of secondary menus identified by handle. Menus are
//! only visible on their own site. Menu items may link to a page, which is subject to the usual
//! page visibility rules, so a link to a hidden page resolves to `null`.

use super::pages::PAGE_INTERFACE;
use super::resolve::{getter, load_references};
use super::{request_context, Services};
use crate::backend::{DataSource, RequestContext};
use crate::blocks::Chooser;
use crate::content::{FlatMenu, Menu, MenuItem};
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, Object, TypeRef};
use async_graphql::Value as GqlValue;
use std::sync::Arc;

const MENU: &str = "Menu";
const MENU_ITEM: &str = "MenuItem";
const SECONDARY_MENU: &str = "SecondaryMenu";

fn items<'a>(items: &[MenuItem]) -> FieldValue<'a> {
    let mut items = items.to_vec();
    items.sort_by_key(|item| item.sort_order);
    FieldValue::list(items.into_iter().map(FieldValue::owned_any))
}

fn on_site(request: &RequestContext, site: i64) -> bool {
    request.site.as_ref().map(|s| s.id == site).unwrap_or(false)
}

fn menu_item_type<D: DataSource>(services: &Arc<Services<D>>) -> Object {
    let svc = services.clone();
    Object::new(MENU_ITEM)
        .field(Field::new("linkPage", TypeRef::named(PAGE_INTERFACE), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let item = ctx.parent_value.try_downcast_ref::<MenuItem>()?;
                let Some(id) = item.link_page else {
                    return Ok(None);
                };
                let request = request_context(&ctx);
                let mut pages = load_references(&services, &request, &Chooser::Page, &[id]).await?;
                Ok(pages
                    .remove(&id)
                    .and_then(|page| page.into_field_value(&services.registry)))
            })
        }))
        .field(getter::<MenuItem>("linkUrl", TypeRef::named(TypeRef::STRING), |i| {
            i.link_url.clone().map(GqlValue::from).unwrap_or(GqlValue::Null)
        }))
        .field(getter::<MenuItem>("linkText", TypeRef::named_nn(TypeRef::STRING), |i| {
            i.link_text.clone().into()
        }))
        .field(getter::<MenuItem>("urlAppend", TypeRef::named_nn(TypeRef::STRING), |i| {
            i.url_append.clone().into()
        }))
        .field(getter::<MenuItem>("allowSubnav", TypeRef::named_nn(TypeRef::BOOLEAN), |i| {
            i.allow_subnav.into()
        }))
        .field(getter::<MenuItem>("sortOrder", TypeRef::named_nn(TypeRef::INT), |i| {
            i.sort_order.into()
        }))
}

fn menu_type() -> Object {
    Object::new(MENU)
        .description("The main navigation menu of a site.")
        .field(getter::<Menu>("maxLevels", TypeRef::named_nn(TypeRef::INT), |m| {
            m.max_levels.into()
        }))
        .field(Field::new(
            "menuItems",
            TypeRef::named_nn_list_nn(MENU_ITEM),
            |ctx| {
                FieldFuture::new(async move {
                    let menu = ctx.parent_value.try_downcast_ref::<Menu>()?;
                    Ok(Some(items(&menu.menu_items)))
                })
            },
        ))
}

fn secondary_menu_type() -> Object {
    Object::new(SECONDARY_MENU)
        .description("A secondary menu, identified by its handle.")
        .field(getter::<FlatMenu>("title", TypeRef::named_nn(TypeRef::STRING), |m| {
            m.title.clone().into()
        }))
        .field(getter::<FlatMenu>("handle", TypeRef::named_nn(TypeRef::STRING), |m| {
            m.handle.clone().into()
        }))
        .field(getter::<FlatMenu>("heading", TypeRef::named_nn(TypeRef::STRING), |m| {
            m.heading.clone().into()
        }))
        .field(getter::<FlatMenu>("maxLevels", TypeRef::named_nn(TypeRef::INT), |m| {
            m.max_levels.into()
        }))
        .field(Field::new(
            "menuItems",
            TypeRef::named_nn_list_nn(MENU_ITEM),
            |ctx| {
                FieldFuture::new(async move {
                    let menu = ctx.parent_value.try_downcast_ref::<FlatMenu>()?;
                    Ok(Some(items(&menu.menu_items)))
                })
            },
        ))
}

pub(crate) fn types<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Object> {
    vec![menu_item_type(services), menu_type(), secondary_menu_type()]
}

pub(crate) fn query_fields<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Field> {
    let svc = services.clone();
    let main_menu = Field::new("mainMenu", TypeRef::named_nn_list_nn(MENU), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let request = request_context(&ctx);
            let menus = services.db.main_menus().await?;
            Ok(Some(FieldValue::list(
                menus
                    .into_iter()
                    .filter(|menu| on_site(&request, menu.site))
                    .map(FieldValue::owned_any),
            )))
        })
    })
    .description("The main menu of the current site.");

    let svc = services.clone();
    let secondary_menu = Field::new("secondaryMenu", TypeRef::named(SECONDARY_MENU), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let request = request_context(&ctx);
            let handle = ctx.args.try_get("handle")?.string()?.to_string();
            let menus = services.db.flat_menus(Some(&handle)).await?;
            Ok(menus
                .into_iter()
                .find(|menu| on_site(&request, menu.site))
                .map(FieldValue::owned_any))
        })
    })
    .argument(InputValue::new("handle", TypeRef::named_nn(TypeRef::STRING)));

    let svc = services.clone();
    let secondary_menus = Field::new(
        "secondaryMenus",
        TypeRef::named_nn_list_nn(SECONDARY_MENU),
        move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let menus = services.db.flat_menus(None).await?;
                Ok(Some(FieldValue::list(
                    menus
                        .into_iter()
                        .filter(|menu| on_site(&request, menu.site))
                        .map(FieldValue::owned_any),
                )))
            })
        },
    );

    vec![main_menu, secondary_menu, secondary_menus]
}
