//! Typed descriptions of the generated schema.
//!
//! Schema construction happens in two passes. The first pass walks the catalog and the block trees
//! of its stream fields and produces the values in this module: [`TypeDef`]s describing object
//! types, [`Handler`]s describing how a block is exposed and converted, and [`UnionDef`]s for
//! stream fields. The second pass, in [`assembly`](super::assembly), turns these descriptions
//! into `async_graphql` dynamic types with resolvers attached.

use crate::blocks::{BlockClass, Chooser, Converter, Primitive, ScalarKind};
use crate::catalog::ModelId;
use async_graphql::dynamic::TypeRef;
use derivative::Derivative;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A deferred lookup of a page, image or snippet by ID.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Reference {
    pub target: Chooser,
    /// The GraphQL type of the referenced rows.
    pub type_name: String,
}

/// How a block is exposed in the schema and how its stored data is converted at query time.
#[derive(Clone, Debug)]
pub enum Handler {
    /// A terminal value, exposed as a GraphQL scalar.
    Scalar(ScalarKind),
    /// An unrecognized block, exposed verbatim as a generic scalar.
    Generic,
    /// A struct block, exposed as a generated object type.
    Object(Arc<TypeDef>),
    /// A chooser, resolved by ID when queried.
    Reference(Reference),
    /// A list of blocks of the same kind.
    List(Box<Handler>),
    /// A block with its own conversion.
    Custom(Arc<CustomHandler>),
}

/// The handler for a [`CustomBlock`](crate::blocks::CustomBlock).
#[derive(Derivative)]
#[derivative(Debug)]
pub struct CustomHandler {
    pub class: BlockClass,
    pub target: Handler,
    #[derivative(Debug = "ignore")]
    pub converter: Option<Converter>,
}

impl Handler {
    /// Is this handler exposed as a GraphQL scalar?
    pub fn is_scalar(&self) -> bool {
        match self {
            Self::Scalar(_) | Self::Generic => true,
            Self::Custom(custom) => custom.target.is_scalar(),
            _ => false,
        }
    }

    /// The GraphQL type of values produced by this handler.
    pub fn type_ref(&self) -> TypeRef {
        match self {
            Self::Scalar(kind) => TypeRef::named(kind.primitive().type_name()),
            Self::Generic => TypeRef::named(Primitive::Generic.type_name()),
            Self::Object(ty) => TypeRef::named(ty.name.clone()),
            Self::Reference(reference) => TypeRef::named(reference.type_name.clone()),
            Self::List(item) => TypeRef::List(Box::new(item.type_ref())),
            Self::Custom(custom) => custom.target.type_ref(),
        }
    }

    /// The key under which the wrapper type for this handler is memoized.
    ///
    /// Built-in handlers share a wrapper per stem. Custom blocks are keyed by their full class
    /// path, so two custom blocks only share a wrapper if they are the same block.
    pub fn wrapper_key(&self) -> String {
        match self {
            Self::Custom(custom) => custom.class.path().to_string(),
            Self::List(item) => format!("{}List", item.wrapper_key()),
            _ => self.wrapper_stem(),
        }
    }

    /// The base of the name of the wrapper type used when this handler is a union member.
    ///
    /// Each distinct stem names a distinct wrapper type: `Char` for char blocks, `CharList` for
    /// lists of them, `PageChooser` for page choosers and so on.
    pub fn wrapper_stem(&self) -> String {
        match self {
            Self::Scalar(kind) => kind.to_string(),
            Self::Generic => Primitive::Generic.to_string(),
            Self::Object(ty) => ty.name.clone(),
            Self::Reference(reference) => format!("{}Chooser", reference.type_name),
            Self::List(item) => format!("{}List", item.wrapper_stem()),
            Self::Custom(custom) => custom
                .class
                .name()
                .trim_end_matches("Block")
                .to_string(),
        }
    }
}

/// How a field of a generated type computes its value.
#[derive(Clone, Debug)]
pub enum FieldPlan {
    /// The primary key of a model instance.
    Id,
    /// An attribute of a model instance.
    Attribute(Primitive),
    /// A list of tags stored on a model instance.
    Tags,
    /// A foreign key stored on a model instance.
    Reference(Reference),
    /// A stream field of a model instance.
    Stream(Arc<UnionDef>),
    /// A child of a struct block.
    Child(Handler),
    /// The content of a wrapped block.
    Value(Handler),
    /// The name of the enclosing block in its stream.
    BlockName,
    /// The fields of a form page.
    FormFields,
}

/// A field of a generated type.
#[derive(Clone, Debug)]
pub struct FieldDef {
    /// The GraphQL name of the field.
    pub name: String,
    /// The key the field's data is stored under.
    pub source: String,
    pub plan: FieldPlan,
    pub description: Option<String>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, source: impl Into<String>, plan: FieldPlan) -> Self {
        Self {
            name: name.into(),
            source: source.into(),
            plan,
            description: None,
        }
    }

    pub fn with_description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }
}

/// What a generated type was synthesized from.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum TypeSource {
    Model(ModelId),
    Block(BlockClass),
    /// A union member wrapping a block which is not itself an object type.
    Wrapper(String),
    /// The result of a form submission mutation.
    FormResult(ModelId),
}

/// A generated object type.
#[derive(Clone, Debug)]
pub struct TypeDef {
    pub name: String,
    pub description: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldDef>,
    pub source: TypeSource,
}

impl TypeDef {
    pub fn new(name: impl Into<String>, source: TypeSource) -> Self {
        Self {
            name: name.into(),
            description: None,
            interfaces: vec![],
            fields: vec![],
            source,
        }
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// One kind of block accepted by a stream field.
#[derive(Clone, Debug)]
pub struct StreamMember {
    pub handler: Handler,
    /// The union member type instances of this block resolve to.
    pub type_name: String,
}

/// The union type of the blocks in a stream field.
#[derive(Clone, Debug)]
pub struct UnionDef {
    pub name: String,
    /// The distinct member types, in declaration order.
    pub members: Vec<String>,
    /// The handler for each block type name stored in the field.
    pub blocks: BTreeMap<String, StreamMember>,
}
