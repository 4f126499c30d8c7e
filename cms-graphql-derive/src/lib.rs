//! Derive macros for the `cms_graphql` crate.

use proc_macro::TokenStream;
use syn::parse_macro_input;

mod block;
mod helpers;

/// Derive a description of a struct block from a Rust struct.
///
/// This macro implements `DescribeBlock` for a struct with named fields. Each field becomes a
/// child block, in declaration order, named after the field. The block type of a child is the
/// description of the field's type, so fields are typically declared with the marker types in
/// `cms_graphql::blocks::kinds`, with `Vec<T>` for list blocks, or with other derived struct
/// blocks.
///
/// Documentation on the struct and its fields is propagated to the generated block and will
/// appear in the exported GraphQL schema.
///
/// The block class identifies the block in the generated schema, and two blocks with the same
/// class share a GraphQL type. It defaults to the module path of the struct, with `::` replaced by
/// `.`, followed by the struct name. It can be overridden with the [`class`](#struct-attributes)
/// attribute.
///
/// # Examples
///
/// ```
/// use cms_graphql::blocks::{kinds::*, Block, DescribeBlock, StructBlock};
///
/// /// A captioned image.
/// #[derive(StructBlock)]
/// #[block(class("gallery.blocks.Figure"))]
/// struct Figure {
///     image: ImageChooserBlock,
///     /// Shown below the image.
///     caption: CharBlock,
///     #[block(rename("credit_line"))]
///     credit: TextBlock,
///     #[block(snippet("people.Author"))]
///     authors: Vec<()>,
///     #[block(skip)]
///     _internal: (),
/// }
///
/// let Block::Struct(figure) = Figure::describe() else { unreachable!() };
/// assert_eq!(figure.class.path(), "gallery.blocks.Figure");
/// assert_eq!(figure.description.as_deref(), Some("A captioned image."));
/// assert_eq!(
///     figure.children.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
///     ["image", "caption", "credit_line", "authors"]
/// );
/// assert_eq!(figure.children[1].description.as_deref(), Some("Shown below the image."));
/// assert!(matches!(figure.children[3].block, Block::List(_)));
/// ```
///
/// # Struct attributes
///
/// | Attribute     | Description                                             | Arg     | Required |
/// |---------------|---------------------------------------------------------|---------|----------|
/// | class         | Override the block class. | string | no |
///
/// # Field attributes
///
/// | Attribute     | Description                                             | Arg    | Required |
/// |---------------|---------------------------------------------------------|---------|----------|
/// | skip          | Do not include this field in the block. | n/a | no |
/// | rename        | Use a different name for the child block. | string | no |
/// | snippet       | Make this field a chooser for the snippet model `app.Model`, ignoring the field's type. If the field's type is a `Vec`, the child is a list of choosers. | string | no |
#[proc_macro_derive(StructBlock, attributes(block))]
pub fn struct_block(input: TokenStream) -> TokenStream {
    block::derive(parse_macro_input!(input)).into()
}
