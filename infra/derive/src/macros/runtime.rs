use proc_macro2::TokenStream;
use quote::quote;
use syn::{Error, Ident, ItemFn, ReturnType, Type};

/// Runtime profiles understood by `#[conveyor_runtime::main(..)]`.
const PROFILES: &[&str] = &["throughput", "compact", "default"];

/// Expands the `#[conveyor_runtime::main]` attribute macro.
#[must_use]
pub fn expand_main(args: TokenStream, input: ItemFn) -> TokenStream {
    try_expand_main(args, input).unwrap_or_else(Error::into_compile_error)
}

fn try_expand_main(args: TokenStream, input: ItemFn) -> syn::Result<TokenStream> {
    if input.sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            input.sig.fn_token,
            "#[conveyor_runtime::main] can only be used on async functions",
        ));
    }
    if !input.sig.inputs.is_empty() {
        return Err(Error::new_spanned(&input.sig.inputs, "main takes no arguments"));
    }
    if !returns_result(&input.sig.output) {
        return Err(Error::new_spanned(
            &input.sig.output,
            "#[conveyor_runtime::main] requires a Result return type",
        ));
    }

    let profile = profile(args)?;
    let ItemFn { attrs, vis, sig, block } = input;
    let name = &sig.ident;
    let output = &sig.output;

    Ok(quote! {
        #(#attrs)*
        #vis fn #name() #output {
            let config = ::conveyor_runtime::RuntimeConfig::#profile();
            let runtime = ::conveyor_runtime::build_runtime_with_config(&config)?;
            runtime.block_on(async move #block)
        }
    })
}

fn profile(args: TokenStream) -> syn::Result<Ident> {
    if args.is_empty() {
        return Ok(Ident::new("default", proc_macro2::Span::call_site()));
    }

    let ident: Ident = syn::parse2(args)?;
    if PROFILES.iter().any(|p| ident == p) {
        Ok(ident)
    } else {
        Err(Error::new_spanned(
            ident,
            format!("unknown runtime profile, expected one of: {}", PROFILES.join(", ")),
        ))
    }
}

fn returns_result(output: &ReturnType) -> bool {
    let ReturnType::Type(_, ty) = output else {
        return false;
    };
    let Type::Path(path) = &**ty else {
        return false;
    };
    path.path.segments.last().is_some_and(|seg| seg.ident == "Result")
}
