//! Synthesis of types for structured content blocks.
//!
//! [`block_handler`] walks a block tree and produces the [`Handler`] describing how the block is
//! exposed. Struct and custom blocks are memoized by class in the [`Registry`], so using the same
//! struct definition in many places yields one GraphQL type. [`stream_field_handler`] then turns
//! the handlers for the blocks a stream field accepts into a union. GraphQL unions may only contain
//! object types, so every handler which is not already an object type is wrapped in an object with
//! `value` and `field` fields; wrappers are memoized by shape so that each union member is a
//! distinct named type.

use super::types::{
    CustomHandler, FieldDef, FieldPlan, Handler, Reference, StreamMember, TypeDef, TypeSource,
    UnionDef,
};
use crate::blocks::{Block, BlockClass, Chooser, StreamBlock, StructBlock};
use crate::error::{Error, Result};
use crate::registry::Registry;
use convert_case::{Case, Casing};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, trace};

/// The name of the synthetic field holding a block's name within its parent.
pub const BLOCK_NAME_FIELD: &str = "field";

/// Build the handler for `block`.
///
/// `prefix` is the formatted naming prefix of the application whose model declared the block; it
/// is prepended to the names of types generated for struct blocks.
pub fn block_handler(registry: &mut Registry, block: &Block, prefix: &str) -> Result<Handler> {
    match block {
        Block::Custom(custom) => {
            let class = custom.class();
            if let Ok(handler) = registry.block(&class) {
                return Ok(handler.clone());
            }

            let target = custom.target();
            if matches!(
                target,
                Block::List(_) | Block::Chooser(_) | Block::Custom(_)
            ) {
                return Err(Error::UnsupportedCustomTarget {
                    class,
                    target: target.category(),
                });
            }
            let target = block_handler(registry, &target, prefix)?;
            let converter = custom.converter();
            if converter.is_none() && !target.is_scalar() {
                return Err(Error::CustomTargetWithoutConverter { class });
            }

            debug!(%class, "built custom block handler");
            let handler = Handler::Custom(Arc::new(CustomHandler {
                class: class.clone(),
                target,
                converter,
            }));
            registry.insert_block(class, handler)
        }
        Block::Struct(block) => {
            if let Ok(handler) = registry.block(&block.class) {
                return Ok(handler.clone());
            }
            let ty = struct_type(registry, block, prefix)?;
            registry.insert_block(block.class.clone(), Handler::Object(Arc::new(ty)))
        }
        Block::List(child) => {
            let item = block_handler(registry, child, prefix)?;
            Ok(Handler::List(Box::new(item)))
        }
        Block::Chooser(chooser) => Ok(Handler::Reference(reference(registry, chooser)?)),
        Block::Scalar(kind) => Ok(Handler::Scalar(*kind)),
        Block::Opaque(class) => {
            trace!(%class, "exposing unrecognized block as a generic scalar");
            Ok(Handler::Generic)
        }
    }
}

/// The type generated for a struct block.
fn struct_type(registry: &mut Registry, block: &StructBlock, prefix: &str) -> Result<TypeDef> {
    let node = format!("{prefix}{}", block.class.name());
    let mut ty = TypeDef::new(node, TypeSource::Block(block.class.clone()));
    ty.description = block.description.clone();

    for child in &block.children {
        let handler = block_handler(registry, &child.block, prefix)?;
        ty.fields.push(
            FieldDef::new(
                child.name.to_case(Case::Camel),
                child.name.clone(),
                FieldPlan::Child(handler),
            )
            .with_description(child.description.clone()),
        );
    }
    if ty.field(BLOCK_NAME_FIELD).is_none() {
        ty.fields.push(block_name_field());
    }

    debug!(name = %ty.name, class = %block.class, "built struct block type");
    Ok(ty)
}

fn block_name_field() -> FieldDef {
    FieldDef::new(BLOCK_NAME_FIELD, BLOCK_NAME_FIELD, FieldPlan::BlockName)
        .with_description(Some("The name of this block in its parent.".into()))
}

/// Resolve the target of a chooser to the type of the rows it references.
pub fn reference(registry: &Registry, chooser: &Chooser) -> Result<Reference> {
    let type_name = match chooser {
        Chooser::Page => super::pages::PAGE_INTERFACE.to_string(),
        Chooser::Image => super::media::IMAGE.to_string(),
        Chooser::Snippet(model) => registry
            .snippet(model)
            .map_err(|_| Error::UnregisteredSnippet {
                model: model.clone(),
            })?
            .name
            .clone(),
    };
    Ok(Reference {
        target: chooser.clone(),
        type_name,
    })
}

/// The name of the union type for stream field `field` on the type `node`.
///
/// The field name is converted to upper camel case by capitalizing each `_`-separated word, so
/// `body` on `HomePage` gives `HomePageBodyType`.
pub fn stream_union_name(node: &str, field: &str) -> String {
    let field = field
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<String>();
    format!("{node}{field}Type")
}

/// Build the union of the blocks accepted by a stream field.
///
/// `handlers` maps each block type name stored in the field to the handler for that block. Every
/// handler is wrapped as necessary so that it is a named object type, and duplicate members are
/// collapsed.
pub fn stream_field_handler(
    registry: &mut Registry,
    union_name: String,
    handlers: Vec<(String, Handler)>,
) -> Result<Arc<UnionDef>> {
    let mut members = vec![];
    let mut blocks = BTreeMap::new();
    for (block_type, handler) in handlers {
        let type_name = union_member(registry, &handler)?;
        if !members.contains(&type_name) {
            members.push(type_name.clone());
        }
        blocks.insert(block_type, StreamMember { handler, type_name });
    }

    debug!(name = %union_name, ?members, "built stream field union");
    registry.insert_union(UnionDef {
        name: union_name,
        members,
        blocks,
    })
}

/// Build the handlers for every block in `stream` and the union combining them.
pub fn stream_field(
    registry: &mut Registry,
    union_name: String,
    stream: &StreamBlock,
    prefix: &str,
) -> Result<Arc<UnionDef>> {
    let handlers = stream
        .children
        .iter()
        .map(|child| Ok((child.name.clone(), block_handler(registry, &child.block, prefix)?)))
        .collect::<Result<Vec<_>>>()?;
    stream_field_handler(registry, union_name, handlers)
}

/// The union member type for blocks handled by `handler`.
fn union_member(registry: &mut Registry, handler: &Handler) -> Result<String> {
    match handler {
        Handler::Object(ty) => Ok(ty.name.clone()),
        Handler::Custom(custom) => match &custom.target {
            Handler::Object(ty) => Ok(ty.name.clone()),
            _ => wrapper(registry, handler),
        },
        _ => wrapper(registry, handler),
    }
}

/// The memoized wrapper type for a non-object handler.
///
/// Wrappers are memoized by [`Handler::wrapper_key`] and named by [`Handler::wrapper_stem`]. Two
/// handlers with different keys but the same stem would produce two types with the same name, which
/// is a [`NameCollision`](crate::error::Error::NameCollision).
fn wrapper(registry: &mut Registry, handler: &Handler) -> Result<String> {
    let key = handler.wrapper_key();
    if let Ok(ty) = registry.scalar_block(&key) {
        return Ok(ty.name.clone());
    }

    let stem = handler.wrapper_stem();
    let mut ty = TypeDef::new(format!("{stem}Block"), TypeSource::Wrapper(stem));
    ty.fields.push(FieldDef::new("value", "value", FieldPlan::Value(handler.clone())));
    ty.fields.push(block_name_field());
    trace!(name = %ty.name, %key, "built union member wrapper");
    Ok(registry.insert_scalar_block(key, ty)?.name.clone())
}

/// The class under which a handler for `block` is memoized, if any.
pub fn memo_class(block: &Block) -> Option<BlockClass> {
    match block {
        Block::Struct(_) | Block::Custom(_) => Some(block.class()),
        _ => None,
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::blocks::{kinds, CustomBlock, DescribeBlock, ScalarKind};
    use crate::catalog::ModelId;
    use crate::registry::Entry;
    use serde_json::Value;

    fn quote() -> Block {
        StructBlock::new("home.blocks.QuoteBlock")
            .child("text", ScalarKind::Text)
            .child("author", ScalarKind::Char)
            .into()
    }

    #[test]
    fn test_struct_memoization() {
        let mut registry = Registry::default();
        let Handler::Object(first) = block_handler(&mut registry, &quote(), "Home").unwrap() else {
            panic!("expected object handler");
        };
        let Handler::Object(second) = block_handler(&mut registry, &quote(), "Home").unwrap()
        else {
            panic!("expected object handler");
        };
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name, "HomeQuoteBlock");
        let names = first.fields.iter().map(|f| f.name.as_str()).collect::<Vec<_>>();
        assert_eq!(names, ["text", "author", "field"]);
    }

    #[test]
    fn test_nested_struct_in_list() {
        let mut registry = Registry::default();
        let gallery: Block = StructBlock::new("home.blocks.Gallery")
            .child("title_text", ScalarKind::Char)
            .child("quotes", Block::list(quote()))
            .child("images", Vec::<kinds::ImageChooserBlock>::describe())
            .into();
        let Handler::Object(ty) = block_handler(&mut registry, &gallery, "").unwrap() else {
            panic!("expected object handler");
        };
        assert_eq!(ty.name, "Gallery");
        assert!(ty.field("titleText").is_some());
        let FieldPlan::Child(Handler::List(item)) = &ty.field("quotes").unwrap().plan else {
            panic!("expected a list of quotes");
        };
        assert!(matches!(&**item, Handler::Object(q) if q.name == "QuoteBlock"));
        let FieldPlan::Child(Handler::List(item)) = &ty.field("images").unwrap().plan else {
            panic!("expected a list of images");
        };
        assert!(matches!(&**item, Handler::Reference(r) if r.type_name == "Image"));
        // Both struct classes are memoized.
        assert_eq!(registry.blocks().len(), 2);
    }

    #[test]
    fn test_distinct_scalar_wrappers() {
        let mut registry = Registry::default();
        let stream = StreamBlock::default()
            .block("heading", ScalarKind::Char)
            .block("subheading", ScalarKind::Char)
            .block("price", ScalarKind::Decimal)
            .block("prices", Block::list(ScalarKind::Decimal))
            .block("page", Chooser::Page)
            .block("raw", Block::Opaque("home.blocks.Embed".into()));
        let union = stream_field(&mut registry, "HomePageBodyType".into(), &stream, "Home").unwrap();

        assert_eq!(
            union.members,
            [
                "CharBlock",
                "DecimalBlock",
                "DecimalListBlock",
                "PageInterfaceChooserBlock",
                "GenericScalarBlock"
            ]
        );
        assert_eq!(union.blocks["heading"].type_name, "CharBlock");
        assert_eq!(union.blocks["subheading"].type_name, "CharBlock");

        // Wrappers are shared between unions.
        let other = StreamBlock::default().block("title", ScalarKind::Char);
        stream_field(&mut registry, "HomePageIntroType".into(), &other, "Home").unwrap();
        assert_eq!(registry.scalar_blocks().len(), 5);
    }

    #[test]
    fn test_union_name() {
        assert_eq!(stream_union_name("Test_app_1TestPage", "body"), "Test_app_1TestPageBodyType");
        assert_eq!(
            stream_union_name("HomePage", "stream_body_extra"),
            "HomePageStreamBodyExtraType"
        );
    }

    #[test]
    fn test_snippet_chooser_requires_registration() {
        let mut registry = Registry::default();
        let model = ModelId::new("people", "Author");
        let chooser = Block::snippet(model.clone());
        assert!(matches!(
            block_handler(&mut registry, &chooser, ""),
            Err(Error::UnregisteredSnippet { .. })
        ));

        registry
            .register(Entry::Snippet {
                model: model.clone(),
                ty: Arc::new(TypeDef::new("PeopleAuthor", TypeSource::Model(model))),
            })
            .unwrap();
        let Handler::Reference(reference) = block_handler(&mut registry, &chooser, "").unwrap() else {
            panic!("expected reference handler");
        };
        assert_eq!(reference.type_name, "PeopleAuthor");
    }

    #[derive(Debug)]
    struct Markdown;

    impl CustomBlock for Markdown {
        fn class(&self) -> BlockClass {
            "home.blocks.MarkdownBlock".into()
        }

        fn target(&self) -> Block {
            ScalarKind::Text.into()
        }
    }

    #[derive(Debug)]
    struct Link(bool);

    impl CustomBlock for Link {
        fn class(&self) -> BlockClass {
            "home.blocks.LinkBlock".into()
        }

        fn target(&self) -> Block {
            StructBlock::new("home.blocks.LinkValue")
                .child("href", ScalarKind::Url)
                .child("text", ScalarKind::Char)
                .into()
        }

        fn converter(&self) -> Option<crate::blocks::Converter> {
            if self.0 {
                Some(Arc::new(|raw: &Value| -> Result<Value, String> {
                    let href = raw.as_str().ok_or("expected a string")?;
                    Ok(serde_json::json!({"href": href, "text": href}))
                }))
            } else {
                None
            }
        }
    }

    #[derive(Debug)]
    struct Links;

    impl CustomBlock for Links {
        fn class(&self) -> BlockClass {
            "home.blocks.LinksBlock".into()
        }

        fn target(&self) -> Block {
            Block::list(ScalarKind::Url)
        }
    }

    #[test]
    fn test_custom_blocks() {
        let mut registry = Registry::default();

        let markdown = block_handler(&mut registry, &Block::custom(Markdown), "").unwrap();
        assert!(markdown.is_scalar());
        assert_eq!(markdown.wrapper_stem(), "Markdown");

        let err = block_handler(&mut registry, &Block::custom(Link(false)), "").unwrap_err();
        assert!(matches!(err, Error::CustomTargetWithoutConverter { .. }), "{err}");

        let link = block_handler(&mut registry, &Block::custom(Link(true)), "").unwrap();
        assert!(!link.is_scalar());

        let err = block_handler(&mut registry, &Block::custom(Links), "").unwrap_err();
        assert!(matches!(err, Error::UnsupportedCustomTarget { target: "list", .. }), "{err}");

        let stream = StreamBlock::default()
            .block("markdown", Block::custom(Markdown))
            .block("link", Block::custom(Link(true)));
        let union = stream_field(&mut registry, "PageBodyType".into(), &stream, "").unwrap();
        assert_eq!(union.members, ["MarkdownBlock", "LinkValue"]);
    }

    #[derive(Debug)]
    struct Named(&'static str, ScalarKind);

    impl CustomBlock for Named {
        fn class(&self) -> BlockClass {
            self.0.into()
        }

        fn target(&self) -> Block {
            self.1.into()
        }
    }

    #[test]
    fn test_custom_wrappers_keyed_by_class() {
        let mut registry = Registry::default();
        let stream = StreamBlock::default()
            .block("intro", Block::custom(Named("home.blocks.MarkdownBlock", ScalarKind::Text)))
            .block("body", Block::custom(Named("home.blocks.MarkdownBlock", ScalarKind::Text)));
        let union = stream_field(&mut registry, "HomePageBodyType".into(), &stream, "").unwrap();
        assert_eq!(union.members, ["MarkdownBlock"]);
        let wrapper = registry.scalar_block("home.blocks.MarkdownBlock").unwrap();
        let FieldPlan::Value(Handler::Custom(custom)) = &wrapper.field("value").unwrap().plan else {
            panic!("expected the custom handler");
        };
        assert_eq!(custom.class.path(), "home.blocks.MarkdownBlock");

        // A different block with the same short name cannot share the wrapper.
        let stream = StreamBlock::default()
            .block("md", Block::custom(Named("blog.blocks.MarkdownBlock", ScalarKind::Text)));
        let err = stream_field(&mut registry, "BlogPageBodyType".into(), &stream, "").unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");

        // Nor can a custom block named like a built-in one.
        let stream = StreamBlock::default()
            .block("n", ScalarKind::Integer)
            .block("code", Block::custom(Named("home.blocks.IntegerBlock", ScalarKind::Char)));
        let err = stream_field(&mut registry, "CodePageBodyType".into(), &stream, "").unwrap_err();
        assert!(matches!(err, Error::NameCollision { .. }), "{err}");
    }

    #[test]
    fn test_memo_class() {
        assert_eq!(memo_class(&quote()), Some("home.blocks.QuoteBlock".into()));
        assert_eq!(memo_class(&ScalarKind::Char.into()), None);
    }
}
