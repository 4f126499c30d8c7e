//! Assembly of the executable schema from the frozen registry.
//!
//! Every [`TypeDef`] in the registry becomes a dynamic object type whose fields resolve according
//! to their [`FieldPlan`]. Model types resolve against a [`Page`] or an [`Instance`], block types
//! against a [`BlockValue`]. The fixed types and root fields are added by the modules responsible
//! for them.

use super::forms;
use super::pages::{self, PAGE_INTERFACE};
use super::resolve::{
    load_references, primitive_value, reference_id, resolve_handler, resolve_stream, BlockValue,
};
use super::types::{FieldDef, FieldPlan, TypeDef, TypeSource};
use super::{media, menus, relay, request_context, scalars, snippets, Services};
use crate::backend::DataSource;
use crate::content::{Instance, Page};
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, Object, ResolverContext, Schema, SchemaError, TypeRef, Union,
};
use async_graphql::Value as GqlValue;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

const QUERY: &str = "Query";
const MUTATION: &str = "Mutation";

/// The model instance a field of a model type reads from.
fn instance<'c>(ctx: &ResolverContext<'c>) -> async_graphql::Result<&'c Instance> {
    if let Ok(page) = ctx.parent_value.try_downcast_ref::<Page>() {
        return Ok(&page.content);
    }
    ctx.parent_value.try_downcast_ref::<Instance>()
}

fn tags(raw: &Value) -> GqlValue {
    let tags = match raw {
        Value::Array(tags) => tags
            .iter()
            .filter_map(|tag| tag.as_str().map(String::from))
            .collect(),
        Value::String(tags) => tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .map(String::from)
            .collect(),
        _ => vec![],
    };
    GqlValue::List(tags.into_iter().map(GqlValue::from).collect())
}

fn field_type(plan: &FieldPlan) -> TypeRef {
    match plan {
        FieldPlan::Id => TypeRef::named_nn(TypeRef::INT),
        FieldPlan::Attribute(primitive) => TypeRef::named(primitive.type_name()),
        FieldPlan::Tags => TypeRef::named_nn_list_nn(TypeRef::STRING),
        FieldPlan::Reference(reference) => TypeRef::named(reference.type_name.clone()),
        FieldPlan::Stream(union) => TypeRef::named_nn_list_nn(union.name.clone()),
        FieldPlan::Child(handler) | FieldPlan::Value(handler) => handler.type_ref(),
        FieldPlan::BlockName => TypeRef::named_nn(TypeRef::STRING),
        FieldPlan::FormFields => TypeRef::named_nn_list_nn(forms::FORM_FIELD),
    }
}

/// Build the resolver for a field of a generated type.
fn field<D: DataSource>(services: &Arc<Services<D>>, def: &FieldDef) -> Field {
    let svc = services.clone();
    let name = def.name.clone();
    let source = def.source.clone();
    let plan = def.plan.clone();
    let field = Field::new(&def.name, field_type(&def.plan), move |ctx| {
        let services = svc.clone();
        let name = name.clone();
        let source = source.clone();
        let plan = plan.clone();
        FieldFuture::new(async move {
            match plan {
                FieldPlan::Id => Ok(Some(FieldValue::value(instance(&ctx)?.id))),
                FieldPlan::Attribute(primitive) => {
                    let raw = instance(&ctx)?.value(&source).clone();
                    Ok(primitive_value(&name, primitive, raw)?.map(FieldValue::value))
                }
                FieldPlan::Tags => {
                    let tags = tags(instance(&ctx)?.value(&source));
                    Ok(Some(FieldValue::value(tags)))
                }
                FieldPlan::Reference(reference) => {
                    let Some(id) = reference_id(&name, instance(&ctx)?.value(&source))? else {
                        return Ok(None);
                    };
                    let request = request_context(&ctx);
                    let mut rows =
                        load_references(&services, &request, &reference.target, &[id]).await?;
                    Ok(rows
                        .remove(&id)
                        .and_then(|row| row.into_field_value(&services.registry)))
                }
                FieldPlan::Stream(union) => {
                    resolve_stream(&union, &source, instance(&ctx)?.streams.get(&source))
                }
                FieldPlan::Child(handler) => {
                    let block = ctx.parent_value.try_downcast_ref::<BlockValue>()?;
                    let raw = block.value.get(&source).cloned().unwrap_or(Value::Null);
                    let request = request_context(&ctx);
                    resolve_handler(services, request, handler, source, raw).await
                }
                FieldPlan::Value(_) => {
                    // The decoded block carries the handler of the block type it was stored as.
                    let block = ctx.parent_value.try_downcast_ref::<BlockValue>()?;
                    let (block_name, raw) = (block.name.clone(), block.value.clone());
                    let handler = block.handler.clone();
                    let request = request_context(&ctx);
                    resolve_handler(services, request, handler, block_name, raw).await
                }
                FieldPlan::BlockName => {
                    let block = ctx.parent_value.try_downcast_ref::<BlockValue>()?;
                    Ok(Some(FieldValue::value(block.name.clone())))
                }
                FieldPlan::FormFields => {
                    let page = ctx.parent_value.try_downcast_ref::<Page>()?;
                    Ok(Some(FieldValue::list(
                        page.form_fields.iter().cloned().map(FieldValue::owned_any),
                    )))
                }
            }
        })
    });
    match &def.description {
        Some(description) => field.description(description),
        None => field,
    }
}

/// Convert a generated type description to an object type.
fn object<D: DataSource>(services: &Arc<Services<D>>, ty: &TypeDef) -> Object {
    if let TypeSource::FormResult(_) = ty.source {
        return forms::result_type(ty);
    }
    let mut object = Object::new(&ty.name);
    if let Some(description) = &ty.description {
        object = object.description(description);
    }
    for def in &ty.fields {
        object = object.field(field(services, def));
    }
    if ty.interfaces.iter().any(|interface| interface == PAGE_INTERFACE) {
        object = pages::implement(services, object);
    }
    object
}

/// Assemble the schema for the registry and data source in `services`.
pub(crate) fn build<D: DataSource>(services: &Arc<Services<D>>) -> Result<Schema, SchemaError> {
    let registry = &services.registry;
    let relay_mode = services.settings.relay;

    let mut query = Object::new(QUERY);
    let root_fields = pages::query_fields(services)
        .into_iter()
        .chain(media::query_fields(services))
        .chain(menus::query_fields(services))
        .chain(snippets::query_fields(services))
        .chain(relay_mode.then(|| relay::node_field(services)));
    for field in root_fields {
        query = query.field(field);
    }

    let mutation = (!registry.forms().is_empty()).then(|| {
        registry
            .forms()
            .values()
            .fold(Object::new(MUTATION), |mutation, form| {
                mutation.field(forms::mutation(
                    services,
                    &form.mutation,
                    &form.model,
                    &form.result.name,
                ))
            })
    });

    let mut schema = Schema::build(QUERY, mutation.as_ref().map(|_| MUTATION), None)
        .register(query)
        .register(pages::interface(relay_mode));
    if let Some(mutation) = mutation {
        schema = schema.register(mutation);
    }
    for scalar in scalars::scalars() {
        schema = schema.register(scalar);
    }
    for object in pages::types(services)
        .into_iter()
        .chain(media::types(services))
        .chain(menus::types(services))
        .chain(forms::types())
    {
        schema = schema.register(object);
    }
    if relay_mode {
        schema = schema.register(relay::node_interface());
        for object in relay::types(services) {
            schema = schema.register(object);
        }
    }
    for union in [
        snippets::snippet_union(registry),
        snippets::settings_union(registry),
    ]
    .into_iter()
    .flatten()
    {
        schema = schema.register(union);
    }

    for ty in registry.types() {
        debug!(name = %ty.name, fields = ty.fields.len(), "adding generated type");
        schema = schema.register(object(services, ty));
    }
    for union in registry.unions().values() {
        let members = union
            .members
            .iter()
            .fold(Union::new(&union.name), |u, member| u.possible_type(member));
        schema = schema.register(members);
    }

    schema.finish()
}
