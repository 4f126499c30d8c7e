//! Derive macro for struct blocks.

use crate::helpers::{parse_docs, BlockAttrs};
use proc_macro2::TokenStream;
use quote::quote;
use syn::{Attribute, Data, DeriveInput, Fields, GenericArgument, Ident, LitStr, PathArguments, Type};

/// Generate a `DescribeBlock` implementation for a struct.
pub fn derive(
    DeriveInput {
        ident,
        generics,
        data,
        attrs,
        ..
    }: DeriveInput,
) -> TokenStream {
    if !generics.params.is_empty() {
        panic!("StructBlock cannot be derived on generic types");
    }
    match data {
        Data::Struct(s) => match s.fields {
            Fields::Named(fields) => generate_struct(ident, attrs, fields.named),
            _ => panic!("StructBlock can only be derived for structs with named fields"),
        },
        _ => panic!("StructBlock can only be derived for structs"),
    }
}

fn generate_struct(
    name: Ident,
    attrs: Vec<Attribute>,
    fields: impl IntoIterator<Item = syn::Field>,
) -> TokenStream {
    let doc = parse_docs(&attrs);

    let class = match BlockAttrs::parse("block", &attrs).arg::<LitStr>("class") {
        Some(class) => quote!(#class.to_string()),
        None => {
            let name = name.to_string();
            quote!(format!("{}.{}", module_path!().replace("::", "."), #name))
        }
    };

    let children = fields
        .into_iter()
        .map(|field| (BlockAttrs::parse("block", &field.attrs), field))
        .filter(|(attrs, _)| !attrs.flag("skip"))
        .map(|(attrs, field)| {
            let ident = field.ident.as_ref().unwrap();
            let child_name = attrs
                .arg::<LitStr>("rename")
                .map(|name| name.value())
                .unwrap_or_else(|| ident.to_string());
            let doc = parse_docs(&field.attrs);
            let ty = &field.ty;
            let block = match attrs.arg::<LitStr>("snippet") {
                Some(model) => snippet_chooser(&model, ty),
                None => quote!(<#ty as cms_graphql::blocks::DescribeBlock>::describe()),
            };
            quote! {
                .documented_child(#child_name, #block, #doc)
            }
        });

    quote! {
        impl cms_graphql::blocks::DescribeBlock for #name {
            fn describe() -> cms_graphql::blocks::Block {
                cms_graphql::blocks::Block::from(
                    cms_graphql::blocks::StructBlock::new(#class)
                        .with_description(#doc)
                        #(#children)*
                )
            }
        }
    }
}

/// A chooser for the snippet model named by `model`, which must have the form `app.Model`.
fn snippet_chooser(model: &LitStr, ty: &Type) -> TokenStream {
    let value = model.value();
    let Some((app, model_name)) = value.split_once('.') else {
        panic!("snippet model must have the form app.Model, got {value}");
    };
    let chooser = quote! {
        cms_graphql::blocks::Block::snippet(
            cms_graphql::catalog::ModelId::new(#app, #model_name)
        )
    };
    if is_vec(ty) {
        quote!(cms_graphql::blocks::Block::list(#chooser))
    } else {
        chooser
    }
}

/// Whether `ty` is syntactically a `Vec<_>`.
fn is_vec(ty: &Type) -> bool {
    let Type::Path(path) = ty else { return false };
    let Some(last) = path.path.segments.last() else { return false };
    last.ident == "Vec"
        && matches!(
            &last.arguments,
            PathArguments::AngleBracketed(args)
                if matches!(args.args.first(), Some(GenericArgument::Type(_)))
        )
}
