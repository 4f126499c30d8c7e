//! Helper functions for implementing procedural macros.

use itertools::Itertools;
use proc_macro2::TokenStream;
use syn::{parenthesized, parse::Parse, Attribute, Expr, Ident, Lit, Meta, Token};

/// The items of the `#[block(...)]` attributes on a struct or field.
///
/// Items are either flags, like `skip`, or take a single argument, like `rename("name")`.
pub struct BlockAttrs(Vec<(Ident, Option<TokenStream>)>);

impl BlockAttrs {
    /// Collect the items of every attribute in `attrs` whose path is `scope`.
    ///
    /// # Panics
    ///
    /// Panics if an attribute in scope is malformed.
    pub fn parse(scope: &str, attrs: &[Attribute]) -> Self {
        let mut items = vec![];
        for attr in attrs.iter().filter(|a| a.path().is_ident(scope)) {
            attr.parse_nested_meta(|meta| {
                let name = meta
                    .path
                    .get_ident()
                    .unwrap_or_else(|| panic!("{scope} attribute must start with an identifier"))
                    .clone();
                let arg = if meta.input.is_empty() || meta.input.peek(Token![,]) {
                    None
                } else {
                    let content;
                    parenthesized!(content in meta.input);
                    Some(content.parse()?)
                };
                items.push((name, arg));
                Ok(())
            })
            .unwrap_or_else(|err| panic!("malformed {scope} attribute: {err}"));
        }
        Self(items)
    }

    /// Is the flag `name` set?
    pub fn flag(&self, name: &str) -> bool {
        self.0.iter().any(|(item, arg)| item == name && arg.is_none())
    }

    /// The argument of the item `name`, if present.
    ///
    /// # Panics
    ///
    /// Panics if the argument does not parse as a `T`.
    pub fn arg<T: Parse>(&self, name: &str) -> Option<T> {
        let tokens = self
            .0
            .iter()
            .find_map(|(item, arg)| (item == name).then_some(arg.as_ref()).flatten())?;
        Some(syn::parse2(tokens.clone()).unwrap_or_else(|_| {
            panic!("argument to {name} must be a {}", std::any::type_name::<T>())
        }))
    }
}

/// Extract documentation from the attributes on an item.
///
/// The documentation is constructed by taking all the `#[doc = "..."]` attributes and concatenating
/// their arguments, separated by newlines.
pub fn parse_docs(attrs: &[Attribute]) -> String {
    attrs
        .iter()
        .filter_map(|attr| {
            let Meta::NameValue(nv) = &attr.meta else { return None; };
            if !nv.path.is_ident("doc") {
                return None;
            }
            let Expr::Lit(lit) = &nv.value else { return None; };
            let Lit::Str(s) = &lit.lit else { return None; };
            Some(s.value().trim().to_string())
        })
        .join("\n")
}
