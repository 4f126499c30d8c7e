//! Images and documents from the media library.

use super::pages::datetime;
use super::resolve::getter;
use super::{request_context, Services};
use crate::backend::{CollectionQuery, DataSource};
use crate::content::{Document, Image, Rect};
use crate::permissions::{visible_documents, visible_images};
use async_graphql::dynamic::{
    Field, FieldFuture, FieldValue, InputValue, Object, ResolverContext, TypeRef,
};
use async_graphql::Value as GqlValue;
use std::sync::Arc;

pub(crate) const IMAGE: &str = "Image";
pub(crate) const DOCUMENT: &str = "Document";
const RECT: &str = "Rect";

fn tags(tags: &[String]) -> GqlValue {
    GqlValue::List(tags.iter().cloned().map(GqlValue::from).collect())
}

fn rect_type() -> Object {
    Object::new(RECT)
        .description("A rectangle in image coordinates.")
        .field(getter::<Rect>("left", TypeRef::named_nn(TypeRef::INT), |r| r.left.into()))
        .field(getter::<Rect>("top", TypeRef::named_nn(TypeRef::INT), |r| r.top.into()))
        .field(getter::<Rect>("right", TypeRef::named_nn(TypeRef::INT), |r| r.right.into()))
        .field(getter::<Rect>("bottom", TypeRef::named_nn(TypeRef::INT), |r| r.bottom.into()))
        .field(getter::<Rect>("x", TypeRef::named_nn(TypeRef::INT), |r| r.x().into()))
        .field(getter::<Rect>("y", TypeRef::named_nn(TypeRef::INT), |r| r.y().into()))
        .field(getter::<Rect>("width", TypeRef::named_nn(TypeRef::INT), |r| r.width().into()))
        .field(getter::<Rect>("height", TypeRef::named_nn(TypeRef::INT), |r| r.height().into()))
}

/// The rendition filter requested by a field's arguments, or the image's default.
fn rendition_arg(ctx: &ResolverContext, image: &Image) -> async_graphql::Result<String> {
    Ok(match ctx.args.get("rendition") {
        Some(rendition) => rendition.string()?.to_string(),
        None => image.default_rendition(),
    })
}

fn image_type<D: DataSource>(services: &Arc<Services<D>>) -> Object {
    let svc = services.clone();
    let url = Field::new("url", TypeRef::named_nn(TypeRef::STRING), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let image = ctx.parent_value.try_downcast_ref::<Image>()?;
            let rendition = rendition_arg(&ctx, image)?;
            let url = services.db.rendition_url(image, &rendition).await?;
            Ok(Some(FieldValue::value(url)))
        })
    })
    .argument(InputValue::new("rendition", TypeRef::named(TypeRef::STRING)))
    .description("The URL of a rendition of the image, generated if it does not exist yet.");

    let svc = services.clone();
    let url_link = Field::new("urlLink", TypeRef::named_nn(TypeRef::STRING), move |ctx| {
        let services = svc.clone();
        FieldFuture::new(async move {
            let image = ctx.parent_value.try_downcast_ref::<Image>()?;
            let rendition = rendition_arg(&ctx, image)?;
            Ok(Some(FieldValue::value(services.db.image_url(image, &rendition))))
        })
    })
    .argument(InputValue::new("rendition", TypeRef::named(TypeRef::STRING)))
    .description("A URL which serves a rendition of the image on demand.");

    Object::new(IMAGE)
        .description("An image in the media library.")
        .field(getter::<Image>("id", TypeRef::named_nn(TypeRef::INT), |i| i.id.into()))
        .field(getter::<Image>("title", TypeRef::named_nn(TypeRef::STRING), |i| {
            i.title.clone().into()
        }))
        .field(getter::<Image>("file", TypeRef::named_nn(TypeRef::STRING), |i| {
            i.file.clone().into()
        }))
        .field(getter::<Image>("width", TypeRef::named_nn(TypeRef::INT), |i| i.width.into()))
        .field(getter::<Image>("height", TypeRef::named_nn(TypeRef::INT), |i| i.height.into()))
        .field(getter::<Image>("createdAt", TypeRef::named("DateTime"), |i| {
            datetime(i.created_at)
        }))
        .field(getter::<Image>(
            "hasFocalPoint",
            TypeRef::named_nn(TypeRef::BOOLEAN),
            |i| i.focal_point.is_some().into(),
        ))
        .field(Field::new("focalPoint", TypeRef::named(RECT), |ctx| {
            FieldFuture::new(async move {
                let image = ctx.parent_value.try_downcast_ref::<Image>()?;
                Ok(image.focal_point.map(FieldValue::owned_any))
            })
        }))
        .field(getter::<Image>("tags", TypeRef::named_nn_list_nn(TypeRef::STRING), |i| {
            tags(&i.tags)
        }))
        .field(url)
        .field(url_link)
}

fn document_type() -> Object {
    Object::new(DOCUMENT)
        .description("A document in the media library.")
        .field(getter::<Document>("id", TypeRef::named_nn(TypeRef::INT), |d| d.id.into()))
        .field(getter::<Document>("title", TypeRef::named_nn(TypeRef::STRING), |d| {
            d.title.clone().into()
        }))
        .field(getter::<Document>("file", TypeRef::named_nn(TypeRef::STRING), |d| {
            d.file.clone().into()
        }))
        .field(getter::<Document>("createdAt", TypeRef::named("DateTime"), |d| {
            datetime(d.created_at)
        }))
        .field(getter::<Document>("url", TypeRef::named_nn(TypeRef::STRING), |d| {
            d.url().into()
        }))
        .field(getter::<Document>("filename", TypeRef::named_nn(TypeRef::STRING), |d| {
            d.filename().into()
        }))
        .field(getter::<Document>(
            "fileExtension",
            TypeRef::named_nn(TypeRef::STRING),
            |d| d.file_extension().into(),
        ))
        .field(getter::<Document>("tags", TypeRef::named_nn_list_nn(TypeRef::STRING), |d| {
            tags(&d.tags)
        }))
}

pub(crate) fn types<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Object> {
    vec![rect_type(), image_type(services), document_type()]
}

/// The media library fields of the root query.
pub(crate) fn query_fields<D: DataSource>(services: &Arc<Services<D>>) -> Vec<Field> {
    let mut fields = vec![];

    let svc = services.clone();
    fields.push(
        Field::new("images", TypeRef::named_nn_list_nn(IMAGE), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let images =
                    visible_images(&*services.db, &request, CollectionQuery::all()).await?;
                Ok(Some(FieldValue::list(images.into_iter().map(FieldValue::owned_any))))
            })
        })
        .description("Images visible to the user."),
    );

    let svc = services.clone();
    fields.push(
        Field::new("image", TypeRef::named(IMAGE), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let id = ctx.args.try_get("id")?.i64()?;
                let images =
                    visible_images(&*services.db, &request, CollectionQuery::all().id(id)).await?;
                Ok(images.into_iter().next().map(FieldValue::owned_any))
            })
        })
        .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::INT))),
    );

    let svc = services.clone();
    fields.push(
        Field::new("documents", TypeRef::named_nn_list_nn(DOCUMENT), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let documents =
                    visible_documents(&*services.db, &request, CollectionQuery::all()).await?;
                Ok(Some(FieldValue::list(documents.into_iter().map(FieldValue::owned_any))))
            })
        })
        .description("Documents visible to the user."),
    );

    let svc = services.clone();
    fields.push(
        Field::new("document", TypeRef::named(DOCUMENT), move |ctx| {
            let services = svc.clone();
            FieldFuture::new(async move {
                let request = request_context(&ctx);
                let id = ctx.args.try_get("id")?.i64()?;
                let documents =
                    visible_documents(&*services.db, &request, CollectionQuery::all().id(id))
                        .await?;
                Ok(documents.into_iter().next().map(FieldValue::owned_any))
            })
        })
        .argument(InputValue::new("id", TypeRef::named_nn(TypeRef::INT))),
    );

    fields
}
