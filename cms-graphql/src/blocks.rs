//! Declarative descriptions of structured content blocks.
//!
//! A stream field stores an ordered sequence of heterogeneous blocks. Each kind of block the field
//! accepts is described by a [`Block`], which may itself nest other blocks: structs contain named
//! children, lists repeat a single child, choosers point at rows of another model, and scalars
//! terminate the tree. The [schema builder](crate::schema) walks these descriptions to synthesize
//! GraphQL types; at query time the same descriptions drive conversion of stored block data.
//!
//! Block trees can be written out by hand using the builders in this module, or derived from Rust
//! structs with [`StructBlock`](cms_graphql_derive::StructBlock).

use crate::catalog::ModelId;
use derive_more::{Display, From};
use serde_json::Value;
use std::fmt::Debug;
use std::sync::Arc;
use strum::{Display as StrumDisplay, EnumIter, EnumString};

pub use cms_graphql_derive::StructBlock;

/// A stable identifier for a block definition.
///
/// Built-in blocks use the name of the corresponding host block class. Struct and custom blocks
/// should use a fully qualified path, since types synthesized from struct blocks are memoized by
/// class.
#[derive(Clone, Debug, Display, From, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct BlockClass(String);

impl From<&str> for BlockClass {
    fn from(s: &str) -> Self {
        Self(s.into())
    }
}

impl BlockClass {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    /// The unqualified name of the class, the last segment of a `.` or `::` separated path.
    pub fn name(&self) -> &str {
        let tail = self.0.rsplit("::").next().unwrap_or(&self.0);
        tail.rsplit('.').next().unwrap_or(tail)
    }

    pub fn path(&self) -> &str {
        &self.0
    }
}

/// The terminal block kinds.
#[derive(
    Clone, Copy, Debug, StrumDisplay, PartialEq, Eq, PartialOrd, Ord, Hash, EnumIter, EnumString,
)]
pub enum ScalarKind {
    Char,
    Text,
    Email,
    Integer,
    Float,
    Decimal,
    Regex,
    #[strum(serialize = "URL")]
    Url,
    Boolean,
    Date,
    Time,
    DateTime,
    RichText,
    #[strum(serialize = "RawHTML")]
    RawHtml,
    BlockQuote,
    Choice,
    MultipleChoice,
    Static,
}

impl ScalarKind {
    /// The GraphQL scalar this block is exposed as.
    pub fn primitive(self) -> Primitive {
        use ScalarKind::*;
        match self {
            Char | Text | Email | Decimal | Regex | Url | RichText | RawHtml | BlockQuote
            | Choice => Primitive::String,
            Integer => Primitive::Int,
            Float => Primitive::Float,
            Boolean => Primitive::Boolean,
            Date => Primitive::Date,
            Time => Primitive::Time,
            DateTime => Primitive::DateTime,
            MultipleChoice | Static => Primitive::Generic,
        }
    }

    /// The host class of this block kind.
    pub fn class(self) -> BlockClass {
        BlockClass::new(format!("{self}Block"))
    }
}

/// GraphQL scalar types used for block values.
#[derive(Clone, Copy, Debug, StrumDisplay, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Primitive {
    String,
    Int,
    Float,
    Boolean,
    Date,
    DateTime,
    Time,
    #[strum(serialize = "GenericScalar")]
    Generic,
}

impl Primitive {
    /// The name of the GraphQL type.
    pub fn type_name(self) -> &'static str {
        match self {
            Self::String => "String",
            Self::Int => "Int",
            Self::Float => "Float",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::DateTime => "DateTime",
            Self::Time => "Time",
            Self::Generic => "GenericScalar",
        }
    }
}

/// The target of a chooser block.
#[derive(Clone, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Chooser {
    #[display(fmt = "Page")]
    Page,
    #[display(fmt = "Image")]
    Image,
    #[display(fmt = "Snippet({})", _0)]
    Snippet(ModelId),
}

impl Chooser {
    pub fn class(&self) -> BlockClass {
        match self {
            Self::Page => "PageChooserBlock".into(),
            Self::Image => "ImageChooserBlock".into(),
            Self::Snippet(_) => "SnippetChooserBlock".into(),
        }
    }
}

/// Converts raw stored data for a custom block into the shape of its target block.
pub type Converter = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

/// A block which declares its own GraphQL representation.
///
/// The target describes the shape the block is exposed as. If the target is a struct block, the
/// block must also provide a [`Converter`] which turns the stored data into an object with the
/// fields of the struct. Scalar targets may omit the converter, in which case the stored data is
/// exposed verbatim.
pub trait CustomBlock: Debug + Send + Sync {
    /// The identifier used to memoize this block's handler.
    fn class(&self) -> BlockClass;

    /// The block this block is exposed as.
    fn target(&self) -> Block;

    fn converter(&self) -> Option<Converter> {
        None
    }
}

/// A node in a block tree.
#[derive(Clone, Debug)]
pub enum Block {
    Scalar(ScalarKind),
    Struct(Arc<StructBlock>),
    List(Box<Block>),
    Chooser(Chooser),
    Custom(Arc<dyn CustomBlock>),
    /// A block with no dedicated handling, exposed as a generic scalar.
    Opaque(BlockClass),
}

impl Block {
    pub fn list(child: impl Into<Block>) -> Self {
        Self::List(Box::new(child.into()))
    }

    pub fn custom(block: impl CustomBlock + 'static) -> Self {
        Self::Custom(Arc::new(block))
    }

    pub fn snippet(model: ModelId) -> Self {
        Self::Chooser(Chooser::Snippet(model))
    }

    pub fn class(&self) -> BlockClass {
        match self {
            Self::Scalar(kind) => kind.class(),
            Self::Struct(block) => block.class.clone(),
            Self::List(_) => "ListBlock".into(),
            Self::Chooser(chooser) => chooser.class(),
            Self::Custom(block) => block.class(),
            Self::Opaque(class) => class.clone(),
        }
    }

    /// A short description of the kind of this block.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Scalar(_) => "scalar",
            Self::Struct(_) => "struct",
            Self::List(_) => "list",
            Self::Chooser(_) => "chooser",
            Self::Custom(_) => "custom",
            Self::Opaque(_) => "opaque",
        }
    }
}

impl From<ScalarKind> for Block {
    fn from(kind: ScalarKind) -> Self {
        Self::Scalar(kind)
    }
}

impl From<Chooser> for Block {
    fn from(chooser: Chooser) -> Self {
        Self::Chooser(chooser)
    }
}

impl From<StructBlock> for Block {
    fn from(block: StructBlock) -> Self {
        Self::Struct(Arc::new(block))
    }
}

/// A named child of a struct or stream block.
#[derive(Clone, Debug)]
pub struct ChildBlock {
    pub name: String,
    pub block: Block,
    pub description: Option<String>,
}

/// A block with a fixed set of named children.
#[derive(Clone, Debug)]
pub struct StructBlock {
    pub class: BlockClass,
    pub description: Option<String>,
    pub children: Vec<ChildBlock>,
}

impl StructBlock {
    pub fn new(class: impl Into<BlockClass>) -> Self {
        Self {
            class: class.into(),
            description: None,
            children: vec![],
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        let description = description.into();
        if !description.is_empty() {
            self.description = Some(description);
        }
        self
    }

    pub fn child(self, name: impl Into<String>, block: impl Into<Block>) -> Self {
        self.documented_child(name, block, "")
    }

    /// Add a child with a description, which is exposed in the schema.
    pub fn documented_child(
        mut self,
        name: impl Into<String>,
        block: impl Into<Block>,
        description: impl Into<String>,
    ) -> Self {
        let description = description.into();
        self.children.push(ChildBlock {
            name: name.into(),
            block: block.into(),
            description: (!description.is_empty()).then_some(description),
        });
        self
    }
}

/// The set of blocks accepted by a stream field, keyed by the block type name stored with each
/// block instance.
#[derive(Clone, Debug, Default)]
pub struct StreamBlock {
    pub children: Vec<ChildBlock>,
}

impl StreamBlock {
    pub fn block(mut self, name: impl Into<String>, block: impl Into<Block>) -> Self {
        self.children.push(ChildBlock {
            name: name.into(),
            block: block.into(),
            description: None,
        });
        self
    }
}

/// Types which can describe themselves as a block.
///
/// This is implemented for the marker types in [`kinds`], for [`Vec`] (as a list block) and, via
/// `#[derive(StructBlock)]`, for user-defined structs.
pub trait DescribeBlock {
    fn describe() -> Block;
}

impl<T: DescribeBlock> DescribeBlock for Vec<T> {
    fn describe() -> Block {
        Block::list(T::describe())
    }
}

/// Marker types naming the built-in block kinds, for use in derived struct blocks.
pub mod kinds {
    use super::{Block, Chooser, DescribeBlock, ScalarKind};

    macro_rules! scalar_markers {
        ($($name:ident => $kind:ident),* $(,)?) => {
            $(
                #[doc = concat!("Marker for a `", stringify!($kind), "` block.")]
                #[derive(Clone, Copy, Debug, Default)]
                pub struct $name;

                impl DescribeBlock for $name {
                    fn describe() -> Block {
                        Block::Scalar(ScalarKind::$kind)
                    }
                }
            )*
        };
    }

    scalar_markers! {
        CharBlock => Char,
        TextBlock => Text,
        EmailBlock => Email,
        IntegerBlock => Integer,
        FloatBlock => Float,
        DecimalBlock => Decimal,
        RegexBlock => Regex,
        UrlBlock => Url,
        BooleanBlock => Boolean,
        DateBlock => Date,
        TimeBlock => Time,
        DateTimeBlock => DateTime,
        RichTextBlock => RichText,
        RawHtmlBlock => RawHtml,
        BlockQuoteBlock => BlockQuote,
        ChoiceBlock => Choice,
        MultipleChoiceBlock => MultipleChoice,
        StaticBlock => Static,
    }

    /// Marker for a page chooser.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct PageChooserBlock;

    impl DescribeBlock for PageChooserBlock {
        fn describe() -> Block {
            Block::Chooser(Chooser::Page)
        }
    }

    /// Marker for an image chooser.
    #[derive(Clone, Copy, Debug, Default)]
    pub struct ImageChooserBlock;

    impl DescribeBlock for ImageChooserBlock {
        fn describe() -> Block {
            Block::Chooser(Chooser::Image)
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::str::FromStr;
    use strum::IntoEnumIterator;

    #[test]
    fn test_scalar_classes_are_distinct() {
        let classes = ScalarKind::iter()
            .map(|kind| kind.class())
            .collect::<std::collections::BTreeSet<_>>();
        assert_eq!(classes.len(), ScalarKind::iter().count());
        assert_eq!(ScalarKind::Url.class().path(), "URLBlock");
        assert_eq!(ScalarKind::from_str("RawHTML").unwrap(), ScalarKind::RawHtml);
    }

    #[test]
    fn test_class_name() {
        assert_eq!(BlockClass::new("home.blocks.QuoteBlock").name(), "QuoteBlock");
        assert_eq!(BlockClass::new("demo::blocks::Gallery").name(), "Gallery");
        assert_eq!(BlockClass::new("Plain").name(), "Plain");
    }

    #[test]
    fn test_describe_vec() {
        let Block::List(child) = Vec::<kinds::ImageChooserBlock>::describe() else {
            panic!("expected a list block");
        };
        assert!(matches!(*child, Block::Chooser(Chooser::Image)));
    }
}
