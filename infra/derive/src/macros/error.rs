use fxhash::FxHashSet;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::punctuated::Punctuated;
use syn::{
    Attribute, Data, DeriveInput, Error, Field, Fields, GenericArgument, Ident, Path,
    PathArguments, PathSegment, Token, Type, Variant,
};

/// One enum variant as seen by the expansion.
struct ErrorVariant<'a> {
    ident: &'a Ident,
    source: Option<&'a Field>,
    has_context: bool,
    cfg: Vec<&'a Attribute>,
}

impl<'a> ErrorVariant<'a> {
    fn parse(variant: &'a Variant) -> syn::Result<Self> {
        let Fields::Named(fields) = &variant.fields else {
            return Err(Error::new_spanned(
                &variant.ident,
                "conveyor_error requires named fields on every variant",
            ));
        };

        let mut context = None;
        for field in &fields.named {
            if field.ident.as_ref().is_some_and(|ident| ident == "context") {
                if !is_context_type(&field.ty) {
                    return Err(Error::new_spanned(
                        &field.ty,
                        "context field must be Option<Cow<'static, str>>",
                    ));
                }
                context = Some(field);
            }
        }

        let source = fields.named.iter().find(|field| {
            field.ident.as_ref().is_some_and(|ident| ident == "source")
                || has_attr(field, "source")
                || has_attr(field, "from")
        });

        if let Some(source) = source {
            if context.is_none() {
                return Err(Error::new_spanned(
                    &variant.ident,
                    "conveyor_error requires `context: Option<Cow<'static, str>>` next to a source",
                ));
            }
            if fields.named.len() != 2 {
                return Err(Error::new_spanned(
                    &source.ty,
                    "a variant with a source may only hold the source and its context",
                ));
            }
        }

        Ok(Self {
            ident: &variant.ident,
            source,
            has_context: context.is_some(),
            cfg: variant.attrs.iter().filter(|attr| attr.path().is_ident("cfg")).collect(),
        })
    }

    fn is_internal(&self) -> bool {
        self.ident == "Internal"
    }
}

pub(crate) fn expand(input: DeriveInput) -> TokenStream {
    try_expand(&input).unwrap_or_else(Error::into_compile_error)
}

fn try_expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let Data::Enum(data) = &input.data else {
        return Err(Error::new_spanned(&input.ident, "conveyor_error can only be applied to enums"));
    };

    let variants =
        data.variants.iter().map(ErrorVariant::parse).collect::<syn::Result<Vec<_>>>()?;
    reject_shared_sources(&variants)?;

    let name = &input.ident;
    let vis = &input.vis;
    let ext = format_ident!("{}Ext", name);

    let derives = missing_derives(&input.attrs)?;
    let context_arms = variants.iter().filter(|v| v.has_context).map(|v| {
        let ident = v.ident;
        let cfg = &v.cfg;
        quote! { #(#cfg)* #name::#ident { context: slot, .. } => *slot = Some(context.into()), }
    });
    let source_impls = variants.iter().filter_map(|v| source_impls(name, &ext, v));
    let internal_impls = variants
        .iter()
        .find(|v| v.is_internal())
        .map(|v| internal_impls(name, v))
        .transpose()?;

    Ok(quote! {
        #[allow(non_shorthand_field_patterns)]
        #derives
        #input

        #vis trait #ext<T> {
            /// Attaches a human-readable context to the error.
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, #name>;
        }

        #[automatically_derived]
        impl<T> #ext<T> for ::std::result::Result<T, #name> {
            #[inline]
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, #name> {
                self.map_err(|mut err| {
                    #[allow(unreachable_patterns)]
                    match &mut err {
                        #(#context_arms)*
                        _ => {},
                    }
                    err
                })
            }
        }

        #(#source_impls)*
        #internal_impls

        #[allow(dead_code, clippy::ref_option)]
        fn format_context(
            context: &Option<::std::borrow::Cow<'static, str>>,
        ) -> ::std::borrow::Cow<'static, str> {
            context.as_ref().map_or(::std::borrow::Cow::Borrowed(""), |c| {
                ::std::borrow::Cow::Owned(format!(" ({c})"))
            })
        }
    })
}

fn source_impls(name: &Ident, ext: &Ident, variant: &ErrorVariant<'_>) -> Option<TokenStream> {
    let source = variant.source?;
    let field = source.ident.as_ref()?;
    let ty = &source.ty;
    let ident = variant.ident;
    let cfg = &variant.cfg;

    Some(quote! {
        #(#cfg)*
        #[automatically_derived]
        impl From<#ty> for #name {
            #[inline]
            fn from(#field: #ty) -> Self {
                Self::#ident { #field, context: None }
            }
        }

        #(#cfg)*
        #[automatically_derived]
        impl<T> #ext<T> for ::std::result::Result<T, #ty> {
            #[inline]
            fn context(
                self,
                context: impl Into<::std::borrow::Cow<'static, str>>,
            ) -> ::std::result::Result<T, #name> {
                self.map_err(|#field| #name::#ident { #field, context: Some(context.into()) })
            }
        }
    })
}

fn internal_impls(name: &Ident, variant: &ErrorVariant<'_>) -> syn::Result<TokenStream> {
    if variant.source.is_some() || !variant.has_context {
        return Err(Error::new_spanned(
            variant.ident,
            "Internal must be declared as `Internal { message, context }`",
        ));
    }
    let cfg = &variant.cfg;

    Ok(quote! {
        #(#cfg)*
        impl From<&'static str> for #name {
            #[inline]
            fn from(message: &'static str) -> Self {
                Self::Internal { message: ::std::borrow::Cow::Borrowed(message), context: None }
            }
        }

        #(#cfg)*
        impl From<String> for #name {
            #[inline]
            fn from(message: String) -> Self {
                Self::Internal { message: ::std::borrow::Cow::Owned(message), context: None }
            }
        }
    })
}

fn reject_shared_sources(variants: &[ErrorVariant<'_>]) -> syn::Result<()> {
    let mut seen = FxHashSet::default();
    for source in variants.iter().filter_map(|v| v.source) {
        let ty = &source.ty;
        if !seen.insert(quote!(#ty).to_string()) {
            return Err(Error::new_spanned(ty, "source type is already wrapped by another variant"));
        }
    }
    Ok(())
}

fn missing_derives(attrs: &[Attribute]) -> syn::Result<TokenStream> {
    let mut derived = FxHashSet::default();
    for attr in attrs.iter().filter(|attr| attr.path().is_ident("derive")) {
        let paths = attr.parse_args_with(Punctuated::<Path, Token![,]>::parse_terminated)?;
        derived.extend(paths.iter().filter_map(|p| p.segments.last()).map(|s| s.ident.to_string()));
    }

    let mut missing = Vec::new();
    if !derived.contains("Debug") {
        missing.push(quote!(Debug));
    }
    if !derived.contains("Error") {
        missing.push(quote!(::thiserror::Error));
    }

    Ok(if missing.is_empty() { quote!() } else { quote!(#[derive(#(#missing),*)]) })
}

fn has_attr(field: &Field, name: &str) -> bool {
    field.attrs.iter().any(|attr| attr.path().is_ident(name))
}

fn last_segment(ty: &Type) -> Option<&PathSegment> {
    let Type::Path(path) = ty else { return None };
    path.path.segments.last()
}

fn type_args(segment: &PathSegment) -> impl Iterator<Item = &GenericArgument> {
    let args = match &segment.arguments {
        PathArguments::AngleBracketed(args) => Some(args.args.iter()),
        _ => None,
    };
    args.into_iter().flatten()
}

/// Matches `Option<Cow<'static, str>>`, with or without leading paths.
fn is_context_type(ty: &Type) -> bool {
    let Some(option) = last_segment(ty).filter(|s| s.ident == "Option") else {
        return false;
    };
    let mut args = type_args(option);
    let (Some(GenericArgument::Type(inner)), None) = (args.next(), args.next()) else {
        return false;
    };
    let Some(cow) = last_segment(inner).filter(|s| s.ident == "Cow") else {
        return false;
    };
    let mut args = type_args(cow);
    match (args.next(), args.next(), args.next()) {
        (Some(GenericArgument::Lifetime(lt)), Some(GenericArgument::Type(text)), None) => {
            lt.ident == "static" && last_segment(text).is_some_and(|s| s.ident == "str")
        },
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::parse_quote;

    fn expanded(input: DeriveInput) -> String {
        expand(input).to_string()
    }

    #[test]
    fn test_generates_ext_trait_and_from_impls() {
        let out = expanded(parse_quote! {
            pub enum QueueError {
                #[error("io{}: {source}", format_context(.context))]
                Io { source: std::io::Error, context: Option<Cow<'static, str>> },
                #[error("internal{}: {message}", format_context(.context))]
                Internal { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
            }
        });

        assert!(out.contains("trait QueueErrorExt"));
        assert!(out.contains("Self :: Io {"));
        assert!(out.contains("fn from (message"));
        assert!(out.contains("thiserror :: Error"));
        assert!(!out.contains("compile_error"));
    }

    #[test]
    fn test_keeps_existing_derives() {
        let out = expanded(parse_quote! {
            #[derive(Clone, Debug)]
            pub enum CloneError {
                #[error("closed{}: {message}", format_context(.context))]
                Closed { message: Cow<'static, str>, context: Option<Cow<'static, str>> },
            }
        });

        assert!(out.contains("thiserror :: Error"));
        assert!(!out.contains("derive (Debug"));
        assert!(!out.contains("compile_error"));
    }

    #[test]
    fn test_rejects_tuple_variant() {
        let out = expanded(parse_quote! {
            pub enum Broken {
                #[error("io: {0}")]
                Io(std::io::Error),
            }
        });
        assert!(out.contains("compile_error"));
        assert!(out.contains("named fields"));
    }

    #[test]
    fn test_rejects_source_without_context() {
        let out = expanded(parse_quote! {
            pub enum Broken {
                #[error("io: {source}")]
                Io { #[source] source: std::io::Error },
            }
        });
        assert!(out.contains("compile_error"));
    }

    #[test]
    fn test_rejects_bad_context_type() {
        let out = expanded(parse_quote! {
            pub enum Broken {
                #[error("io: {source}")]
                Io { source: std::io::Error, context: Option<String> },
            }
        });
        assert!(out.contains("context field must be"));
    }

    #[test]
    fn test_rejects_shared_source_type() {
        let out = expanded(parse_quote! {
            pub enum Broken {
                #[error("read")]
                Read { source: std::io::Error, context: Option<Cow<'static, str>> },
                #[error("write")]
                Write { source: std::io::Error, context: Option<Cow<'static, str>> },
            }
        });
        assert!(out.contains("already wrapped"));
    }

    #[test]
    fn test_rejects_structs() {
        let out = expanded(parse_quote! {
            pub struct NotAnEnum { message: String }
        });
        assert!(out.contains("only be applied to enums"));
    }

    #[test]
    fn test_context_type_matching() {
        assert!(is_context_type(&parse_quote!(Option<Cow<'static, str>>)));
        assert!(is_context_type(&parse_quote!(
            std::option::Option<std::borrow::Cow<'static, str>>
        )));
        assert!(!is_context_type(&parse_quote!(Option<Cow<'a, str>>)));
        assert!(!is_context_type(&parse_quote!(Option<&'static str>)));
    }
}
