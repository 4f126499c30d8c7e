//! Conversion of stored block data at query time.
//!
//! Stream field values are decoded into [`BlockValue`]s, each tagged with the union member type it
//! resolves to. Fields of block types then convert their slice of the stored data according to the
//! [`Handler`] built for them: scalars are checked and passed through, references are looked up by
//! ID, lists convert each element in order, and custom blocks run their converter first.

use super::types::{Handler, StreamMember, UnionDef};
use super::Services;
use crate::backend::{CollectionQuery, DataSource, PageQuery, RequestContext};
use crate::blocks::{Chooser, Primitive};
use crate::content::{Id, Image, Instance, Page, RawBlock, StreamValue};
use crate::error::Error;
use crate::permissions::{visible_images, visible_pages};
use crate::registry::Registry;
use async_graphql::dynamic::{Field, FieldFuture, FieldValue, TypeRef};
use async_graphql::Value as GqlValue;
use futures::future::{try_join_all, BoxFuture, FutureExt};
use itertools::Itertools;
use serde_json::{Number, Value};
use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{trace, warn};

/// The result of resolving a field.
pub(crate) type Resolved<'a> = async_graphql::Result<Option<FieldValue<'a>>>;

/// A block instance, the parent value of fields of struct block types and union member wrappers.
#[derive(Clone, Debug)]
pub struct BlockValue {
    /// The name of the block in its parent: the block type in a stream, or the child name in a
    /// struct.
    pub name: String,
    /// The stored data, after conversion by a custom block's converter if there is one.
    pub value: Value,
    pub handler: Handler,
}

/// A row referenced by a chooser.
#[derive(Clone, Debug)]
pub(crate) enum Referenced {
    Page(Page),
    Image(Image),
    Snippet(Instance),
}

impl Referenced {
    fn id(&self) -> Id {
        match self {
            Self::Page(page) => page.id,
            Self::Image(image) => image.id,
            Self::Snippet(snippet) => snippet.id,
        }
    }

    /// The value of the referenced row, or `None` for a page whose model is not exposed.
    pub(crate) fn into_field_value<'a>(self, registry: &Registry) -> Option<FieldValue<'a>> {
        match self {
            Self::Page(page) => page_value(registry, page),
            Self::Image(image) => Some(FieldValue::owned_any(image)),
            Self::Snippet(snippet) => Some(FieldValue::owned_any(snippet)),
        }
    }
}

/// A page, tagged with its concrete type so it can be returned from fields of interface type.
///
/// Pages of models which are not exposed have no type in the schema and resolve to `None`.
pub(crate) fn page_value<'a>(registry: &Registry, page: Page) -> Option<FieldValue<'a>> {
    match registry.page_type(page.model()) {
        Ok(ty) => {
            let ty = ty.name.clone();
            Some(FieldValue::owned_any(page).with_type(ty))
        }
        Err(_) => {
            warn!(page = page.id, model = %page.model(), "page of unexposed model");
            None
        }
    }
}

/// A field reading a plain value from a parent of type `T`.
pub(crate) fn getter<T: Any + Send + Sync>(
    name: &str,
    ty: TypeRef,
    get: fn(&T) -> GqlValue,
) -> Field {
    Field::new(name, ty, move |ctx| {
        FieldFuture::new(async move {
            let parent = ctx.parent_value.try_downcast_ref::<T>()?;
            Ok(Some(FieldValue::value(get(parent))))
        })
    })
}

/// Interpret stored data as the ID of a referenced row.
///
/// IDs may be stored as numbers, numeric strings or objects with an `id` key.
pub(crate) fn reference_id(field: &str, raw: &Value) -> Result<Option<Id>, Error> {
    match raw {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .map(Some)
            .ok_or_else(|| Error::malformed(field, format!("invalid ID {n}"))),
        Value::String(s) => s
            .parse()
            .map(Some)
            .map_err(|_| Error::malformed(field, format!("invalid ID {s:?}"))),
        Value::Object(obj) => reference_id(field, obj.get("id").unwrap_or(&Value::Null)),
        other => Err(Error::malformed(field, format!("invalid ID {other}"))),
    }
}

/// Load the rows with the given IDs, in one batch, as visible to `request`.
pub(crate) async fn load_references<D: DataSource>(
    services: &Services<D>,
    request: &RequestContext,
    target: &Chooser,
    ids: &[Id],
) -> async_graphql::Result<HashMap<Id, Referenced>> {
    if ids.is_empty() {
        return Ok(HashMap::new());
    }
    trace!(%target, ?ids, "loading references");
    let db = &*services.db;
    let rows = match target {
        Chooser::Page => visible_pages(db, request, PageQuery::all().ids(ids.iter().copied()))
            .await?
            .into_iter()
            .map(Referenced::Page)
            .collect::<Vec<_>>(),
        Chooser::Image => {
            visible_images(db, request, CollectionQuery::all().ids(ids.iter().copied()))
                .await?
                .into_iter()
                .map(Referenced::Image)
                .collect()
        }
        Chooser::Snippet(model) => db
            .snippets(model, Some(ids))
            .await?
            .into_iter()
            .map(Referenced::Snippet)
            .collect(),
    };
    Ok(rows.into_iter().map(|row| (row.id(), row)).collect())
}

/// Project rows loaded in a batch back onto the stored list of IDs.
///
/// Missing IDs and dangling references become `None`. Repeated IDs repeat the row.
fn in_stored_order<T: Clone>(ids: &[Option<Id>], rows: &HashMap<Id, T>) -> Vec<Option<T>> {
    ids.iter()
        .map(|id| id.and_then(|id| rows.get(&id)).cloned())
        .collect()
}

/// Convert stored data to a GraphQL scalar.
pub(crate) fn primitive_value(
    field: &str,
    primitive: Primitive,
    raw: Value,
) -> Result<Option<GqlValue>, Error> {
    let mismatch = |raw: &Value| Error::malformed(field, format!("expected {primitive}, got {raw}"));
    let value = match primitive {
        _ if raw.is_null() => return Ok(None),
        Primitive::String | Primitive::Date | Primitive::DateTime | Primitive::Time => match raw {
            Value::String(s) => GqlValue::String(s),
            // Decimals are commonly stored as JSON numbers.
            Value::Number(n) => GqlValue::String(n.to_string()),
            Value::Bool(b) => GqlValue::String(b.to_string()),
            other => return Err(mismatch(&other)),
        },
        Primitive::Int => {
            let n = raw
                .as_i64()
                .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| mismatch(&raw))?;
            GqlValue::Number(n.into())
        }
        Primitive::Float => {
            let n = raw
                .as_f64()
                .or_else(|| raw.as_str().and_then(|s| s.trim().parse().ok()))
                .and_then(Number::from_f64)
                .ok_or_else(|| mismatch(&raw))?;
            GqlValue::Number(n)
        }
        Primitive::Boolean => GqlValue::Boolean(raw.as_bool().ok_or_else(|| mismatch(&raw))?),
        Primitive::Generic => GqlValue::from_json(raw).map_err(|err| Error::malformed(field, err))?,
    };
    Ok(Some(value))
}

/// Resolve stored data according to `handler`.
///
/// `name` is the name of the block being resolved, used for the synthetic `field` of struct
/// blocks and in error messages.
pub(crate) fn resolve_handler<'a, D: DataSource>(
    services: Arc<Services<D>>,
    request: RequestContext,
    handler: Handler,
    name: String,
    raw: Value,
) -> BoxFuture<'a, Resolved<'a>> {
    async move {
        match &handler {
            Handler::Scalar(kind) => {
                Ok(primitive_value(&name, kind.primitive(), raw)?.map(FieldValue::value))
            }
            Handler::Generic => Ok(Some(FieldValue::value(GqlValue::from_json(raw)?))),
            Handler::Object(ty) => {
                if raw.is_null() {
                    return Ok(None);
                }
                if !raw.is_object() {
                    return Err(Error::malformed(
                        name,
                        format!("expected an object for {}, got {raw}", ty.name),
                    )
                    .into());
                }
                Ok(Some(FieldValue::owned_any(BlockValue {
                    name,
                    value: raw,
                    handler: handler.clone(),
                })))
            }
            Handler::Reference(reference) => {
                let Some(id) = reference_id(&name, &raw)? else {
                    return Ok(None);
                };
                let mut rows = load_references(&services, &request, &reference.target, &[id]).await?;
                Ok(rows
                    .remove(&id)
                    .and_then(|row| row.into_field_value(&services.registry)))
            }
            Handler::List(item) => {
                let items = match raw {
                    Value::Null => return Ok(None),
                    Value::Array(items) => items,
                    other => {
                        return Err(
                            Error::malformed(name, format!("expected a list, got {other}")).into(),
                        )
                    }
                };

                if let Handler::Reference(reference) = &**item {
                    // Fetch every referenced row at once, then put them back in stored order.
                    let ids = items
                        .iter()
                        .map(|raw| reference_id(&name, raw))
                        .collect::<Result<Vec<_>, _>>()?;
                    let unique = ids.iter().flatten().copied().unique().collect::<Vec<_>>();
                    let rows =
                        load_references(&services, &request, &reference.target, &unique).await?;
                    let values = in_stored_order(&ids, &rows).into_iter().map(|row| {
                        row.and_then(|row| row.into_field_value(&services.registry))
                            .unwrap_or(FieldValue::NULL)
                    });
                    return Ok(Some(FieldValue::list(values)));
                }

                let values = try_join_all(items.into_iter().map(|raw| {
                    resolve_handler(
                        services.clone(),
                        request.clone(),
                        (**item).clone(),
                        name.clone(),
                        raw,
                    )
                }))
                .await?;
                Ok(Some(FieldValue::list(
                    values.into_iter().map(|value| value.unwrap_or(FieldValue::NULL)),
                )))
            }
            Handler::Custom(custom) => {
                let value = match &custom.converter {
                    Some(convert) => convert(&raw).map_err(|err| Error::malformed(&name, err))?,
                    None => raw,
                };
                resolve_handler(services, request, custom.target.clone(), name, value).await
            }
        }
    }
    .boxed()
}

/// Decode a stored block into the value of its union member.
pub(crate) fn element_value(
    member: &StreamMember,
    field: &str,
    block: RawBlock,
) -> Result<BlockValue, Error> {
    let (handler, value) = match &member.handler {
        Handler::Custom(custom) if matches!(custom.target, Handler::Object(_)) => {
            let value = match &custom.converter {
                Some(convert) => convert(&block.value).map_err(|err| Error::malformed(field, err))?,
                None => block.value,
            };
            (custom.target.clone(), value)
        }
        handler => (handler.clone(), block.value),
    };
    if matches!(handler, Handler::Object(_)) && !value.is_object() {
        return Err(Error::malformed(
            field,
            format!("expected an object for {}, got {value}", block.block_type),
        ));
    }
    Ok(BlockValue {
        name: block.block_type,
        value,
        handler,
    })
}

/// Resolve the blocks stored in a stream field to a list of union members.
///
/// A block whose type is not accepted by the field is an error, as is a block whose data does not
/// have the shape of its type.
pub(crate) fn resolve_stream<'a>(
    union: &UnionDef,
    field: &str,
    stream: Option<&StreamValue>,
) -> Resolved<'a> {
    let Some(stream) = stream else {
        return Ok(Some(FieldValue::list(Vec::<FieldValue>::new())));
    };
    let elements = stream
        .blocks(field)?
        .into_iter()
        .map(|block| {
            let member = union.blocks.get(&block.block_type).ok_or_else(|| {
                Error::UnknownBlockType {
                    field: field.into(),
                    block_type: block.block_type.clone(),
                }
            })?;
            let value = element_value(member, field, block)?;
            Ok(FieldValue::owned_any(value).with_type(member.type_name.clone()))
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(Some(FieldValue::list(elements)))
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::{BlockClass, ScalarKind};
    use crate::schema::types::{CustomHandler, TypeDef, TypeSource};
    use proptest::{prelude::*, test_runner::Config};
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_primitive_values() {
        assert_eq!(
            primitive_value("f", Primitive::String, json!(12.5)).unwrap(),
            Some(GqlValue::String("12.5".into()))
        );
        assert_eq!(
            primitive_value("f", Primitive::Int, json!("42")).unwrap(),
            Some(GqlValue::Number(42.into()))
        );
        assert_eq!(primitive_value("f", Primitive::Int, json!(null)).unwrap(), None);
        assert_eq!(
            primitive_value("f", Primitive::Generic, json!({"a": [1]})).unwrap(),
            Some(GqlValue::from_json(json!({"a": [1]})).unwrap())
        );
        let err = primitive_value("f", Primitive::Boolean, json!("yes")).unwrap_err();
        assert!(err.is_data_error(), "{err}");
    }

    #[test]
    fn test_reference_ids() {
        assert_eq!(reference_id("f", &json!(3)).unwrap(), Some(3));
        assert_eq!(reference_id("f", &json!("4")).unwrap(), Some(4));
        assert_eq!(reference_id("f", &json!({"id": 5})).unwrap(), Some(5));
        assert_eq!(reference_id("f", &json!(null)).unwrap(), None);
        assert!(reference_id("f", &json!([1])).is_err());
    }

    fn link_type() -> Arc<TypeDef> {
        Arc::new(TypeDef::new(
            "LinkValue",
            TypeSource::Block(BlockClass::new("home.blocks.LinkValue")),
        ))
    }

    #[test]
    fn test_element_value() {
        let member = StreamMember {
            handler: Handler::Scalar(ScalarKind::Char),
            type_name: "CharBlock".into(),
        };
        let block = RawBlock {
            block_type: "h1".into(),
            value: json!("Hello"),
            id: None,
        };
        let value = element_value(&member, "body", block).unwrap();
        assert_eq!(value.name, "h1");
        assert_eq!(value.value, json!("Hello"));

        // Custom blocks targeting structs are converted before their fields are resolved.
        let custom = Handler::Custom(Arc::new(CustomHandler {
            class: "home.blocks.LinkBlock".into(),
            target: Handler::Object(link_type()),
            converter: Some(Arc::new(|raw: &Value| -> Result<Value, String> {
                Ok(json!({ "href": raw }))
            })),
        }));
        let member = StreamMember {
            handler: custom,
            type_name: "LinkValue".into(),
        };
        let block = RawBlock {
            block_type: "link".into(),
            value: json!("/about"),
            id: None,
        };
        let value = element_value(&member, "body", block).unwrap();
        assert!(matches!(value.handler, Handler::Object(_)));
        assert_eq!(value.value, json!({"href": "/about"}));
    }

    #[test]
    fn test_element_value_requires_object() {
        let member = StreamMember {
            handler: Handler::Object(link_type()),
            type_name: "LinkValue".into(),
        };
        let block = RawBlock {
            block_type: "link".into(),
            value: json!(5),
            id: None,
        };
        let err = element_value(&member, "body", block).unwrap_err();
        assert!(err.is_data_error(), "{err}");
    }

    #[test]
    fn test_unknown_block_type() {
        let union = UnionDef {
            name: "HomePageBodyType".into(),
            members: vec!["CharBlock".into()],
            blocks: BTreeMap::from([(
                "h1".to_string(),
                StreamMember {
                    handler: Handler::Scalar(ScalarKind::Char),
                    type_name: "CharBlock".into(),
                },
            )]),
        };
        let stream = StreamValue::lazy([json!({"type": "h1", "value": "Hi"})]);
        assert!(resolve_stream(&union, "body", Some(&stream)).is_ok());

        let stream = StreamValue::lazy([json!({"type": "video", "value": "x"})]);
        let err = resolve_stream(&union, "body", Some(&stream)).unwrap_err();
        assert!(err.message.contains("unknown block type video"), "{}", err.message);
    }

    #[test]
    fn test_stored_order_with_dangling() {
        let rows = HashMap::from([(1, "a"), (3, "c")]);
        assert_eq!(
            in_stored_order(&[Some(3), Some(2), None, Some(1), Some(3)], &rows),
            [Some("c"), None, None, Some("a"), Some("c")]
        );
    }

    proptest! {
        #![proptest_config(Config {
            timeout: 100,
            ..Default::default()
        })]

        #[test]
        fn test_stored_order_preserved(ids in prop::collection::vec(0..10i64, 0..20)) {
            // Rows come back from a batch keyed by ID, in no particular order.
            let rows = ids.iter().map(|id| (*id, id * 100)).collect::<HashMap<_, _>>();
            let ordered = in_stored_order(
                &ids.iter().copied().map(Some).collect::<Vec<_>>(),
                &rows,
            );
            prop_assert_eq!(
                ordered,
                ids.iter().map(|id| Some(id * 100)).collect::<Vec<_>>()
            );
        }
    }
}
