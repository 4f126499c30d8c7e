//! Snippet and settings queries.
//!
//! Both are exposed through unions of the generated types, which only exist when at least one
//! model of the kind is registered.

use super::types::TypeSource;
use super::{request_context, Services};
use crate::backend::DataSource;
use crate::registry::Registry;
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, InputValue, TypeRef, Union};
use std::sync::Arc;
use tracing::trace;

pub(crate) const SNIPPET: &str = "Snippet";
pub(crate) const SETTINGS: &str = "Settings";

/// The union of every snippet type, if any snippets are registered.
pub(crate) fn snippet_union(registry: &Registry) -> Option<Union> {
    let snippets = registry.snippets();
    if snippets.is_empty() {
        return None;
    }
    Some(
        snippets
            .values()
            .fold(Union::new(SNIPPET), |union, name| union.possible_type(name)),
    )
}

/// The union of every settings type, if any settings are registered.
pub(crate) fn settings_union(registry: &Registry) -> Option<Union> {
    let settings = registry.settings();
    if settings.is_empty() {
        return None;
    }
    Some(
        settings
            .values()
            .fold(Union::new(SETTINGS), |union, entry| {
                union.possible_type(&entry.ty.name)
            }),
    )
}

pub(crate) fn query_fields<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Field> {
    let mut fields = vec![];

    if !services.registry.snippets().is_empty() {
        let svc = services.clone();
        fields.push(
            Field::new("snippets", TypeRef::named_nn_list_nn(SNIPPET), move |ctx| {
                let services = svc.clone();
                FieldFuture::new(async move {
                    let typename = ctx.args.try_get("typename")?.string()?.to_string();
                    let ty = services.registry.snippet_by_name(&typename)?;
                    let model = match &ty.source {
                        TypeSource::Model(model) => model.clone(),
                        other => {
                            return Err(format!("{typename} is not a snippet ({other:?})").into())
                        }
                    };
                    let rows = services.db.snippets(&model, None).await?;
                    trace!(%model, rows = rows.len(), "loaded snippets");
                    Ok(Some(FieldValue::list(rows.into_iter().map(|row| {
                        FieldValue::owned_any(row).with_type(typename.clone())
                    }))))
                })
            })
            .argument(InputValue::new("typename", TypeRef::named_nn(TypeRef::STRING)))
            .description("All instances of the snippet type named `typename`."),
        );
    }

    if !services.registry.settings().is_empty() {
        let svc = services.clone();
        fields.push(
            Field::new("settings", TypeRef::named(SETTINGS), move |ctx| {
                let services = svc.clone();
                FieldFuture::new(async move {
                    let name = ctx.args.try_get("name")?.string()?.to_string();
                    let entry = services
                        .registry
                        .setting(&name)
                        .map_err(|_| format!("Settings '{name}' not found."))?;
                    let request = request_context(&ctx);
                    let setting = services
                        .db
                        .setting(&entry.model, request.site.as_ref())
                        .await?;
                    Ok(setting.map(|setting| {
                        FieldValue::owned_any(setting).with_type(entry.ty.name.clone())
                    }))
                })
            })
            .argument(InputValue::new("name", TypeRef::named_nn(TypeRef::STRING)))
            .description("The settings object named `name` for the current site."),
        );
    }

    fields
}
