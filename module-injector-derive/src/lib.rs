//! Derive and attribute macros for module-injector
//!
//! - `#[derive(Inject)]` - Implement `Construct` so a struct can be registered
//!   with `Module::service_type` or built with `Injector::construct`
//! - `#[injectable]` - Turn a plain function into a function returning an
//!   `Injectable` whose tokens are its parameter names
//!
//! # Inject Example
//!
//! ```rust,ignore
//! use module_injector::{Inject, ModuleRegistry, create_injector};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! #[derive(Inject)]
//! struct UserService {
//!     #[inject]
//!     database: Arc<Database>,
//!     #[inject(token = "app.name")]
//!     app_name: String,
//!     // Non-injected fields use Default
//!     request_count: u64,
//! }
//!
//! let registry = ModuleRegistry::new();
//! registry
//!     .module("app", Vec::<String>::new())?
//!     .value("database", Database { url: "postgres://localhost".into() })
//!     .value("app.name", String::from("demo"))
//!     .service_type::<UserService>("users");
//!
//! let injector = create_injector(&registry, ["app"], false)?;
//! let users = injector.get::<UserService>("users")?;
//! ```
//!
//! # Injectable Example
//!
//! ```rust,ignore
//! use module_injector::injectable;
//! use std::sync::Arc;
//!
//! #[injectable]
//! fn shout(greeting: Arc<String>) -> String {
//!     greeting.to_uppercase()
//! }
//!
//! // `shout()` now returns an Injectable annotated with ["greeting"]
//! registry.module("app", Vec::<String>::new())?.factory("shout", shout());
//! ```

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{
    parse_macro_input, Attribute, Data, DeriveInput, Fields, FnArg, ItemFn, LitStr, Pat, ReturnType,
    Type,
};

/// Derive macro implementing `Construct`.
///
/// # Attributes
///
/// - `#[inject]` - Resolve the field from the token named like the field.
/// - `#[inject(token = "name")]` - Resolve the field from an explicit token.
///
/// Field types decide how the resolved value is taken:
///
/// - `Arc<T>` - the shared value, downcast to `T`
/// - `Instance` - the erased value as-is
/// - anything else - a clone of the resolved value
///
/// Fields without `#[inject]` use `Default::default()`.
///
/// If every injected field names its token, the annotation is explicit;
/// otherwise it is inferred from field names and strict injectors refuse it.
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Inject)]
/// struct MyService {
///     #[inject]
///     db: Arc<Database>,
///     #[inject(token = "limits")]
///     limits: Limits,
///     counter: u64,
/// }
/// ```
#[proc_macro_derive(Inject, attributes(inject))]
pub fn derive_inject(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand_inject(&input)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_inject(input: &DeriveInput) -> syn::Result<TokenStream2> {
    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    input,
                    "Inject can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(input, "Inject can only be derived for structs"));
        }
    };

    let mut tokens = Vec::new();
    let mut all_explicit = true;
    let mut field_inits = Vec::new();

    for field in fields {
        let Some(field_name) = field.ident.as_ref() else {
            continue;
        };

        match find_inject_attr(&field.attrs)? {
            Some(InjectAttr { token }) => {
                let index = tokens.len();
                let token = match token {
                    Some(token) => token.value(),
                    None => {
                        all_explicit = false;
                        field_name.unraw().to_string()
                    }
                };
                tokens.push(token);

                let value = take_argument(&field.ty, index);
                field_inits.push(quote! { #field_name: #value });
            }
            None => {
                field_inits.push(quote! {
                    #field_name: ::std::default::Default::default()
                });
            }
        }
    }

    let tokens = string_list(&tokens);
    let annotation = if all_explicit {
        quote! { ::module_injector::Annotation::explicit(#tokens) }
    } else {
        quote! { ::module_injector::Annotation::inferred(#tokens) }
    };

    Ok(quote! {
        impl #impl_generics ::module_injector::Construct for #name #ty_generics #where_clause {
            fn annotation() -> ::module_injector::Annotation {
                #annotation
            }

            #[allow(unused_variables)]
            fn construct(
                args: &::module_injector::Arguments,
            ) -> ::module_injector::Result<Self> {
                ::std::result::Result::Ok(Self {
                    #(#field_inits),*
                })
            }
        }
    })
}

/// Parsed `#[inject]` attribute
struct InjectAttr {
    token: Option<LitStr>,
}

/// Find and parse the #[inject] attribute
fn find_inject_attr(attrs: &[Attribute]) -> syn::Result<Option<InjectAttr>> {
    let Some(attr) = attrs.iter().find(|attr| attr.path().is_ident("inject")) else {
        return Ok(None);
    };

    if attr.meta.require_path_only().is_ok() {
        return Ok(Some(InjectAttr { token: None }));
    }

    let mut token = None;
    attr.parse_nested_meta(|meta| {
        if meta.path.is_ident("token") {
            token = Some(meta.value()?.parse::<LitStr>()?);
            Ok(())
        } else {
            Err(meta.error("expected `token = \"...\"`"))
        }
    })?;
    Ok(Some(InjectAttr { token }))
}

/// A `Vec<&'static str>` literal; typed so an empty list still infers
fn string_list(items: &[String]) -> TokenStream2 {
    quote! { ::std::vec::Vec::<&'static str>::from([#(#items),*]) }
}

/// Expression reading argument `index` as a value of type `ty`
fn take_argument(ty: &Type, index: usize) -> TokenStream2 {
    if let Some(inner) = extract_arc_inner_type(ty) {
        quote! { args.get::<#inner>(#index)? }
    } else if is_instance(ty) {
        quote! { args.instance(#index)? }
    } else {
        quote! { args.cloned::<#ty>(#index)? }
    }
}

fn last_segment(ty: &Type) -> Option<&syn::PathSegment> {
    match ty {
        Type::Path(type_path) if type_path.qself.is_none() => type_path.path.segments.last(),
        _ => None,
    }
}

/// Extract T from Arc<T>
fn extract_arc_inner_type(ty: &Type) -> Option<&Type> {
    let segment = last_segment(ty)?;
    if segment.ident != "Arc" {
        return None;
    }
    match &segment.arguments {
        syn::PathArguments::AngleBracketed(args) => match args.args.first() {
            Some(syn::GenericArgument::Type(inner)) => Some(inner),
            _ => None,
        },
        _ => None,
    }
}

fn is_instance(ty: &Type) -> bool {
    last_segment(ty).is_some_and(|segment| segment.ident == "Instance" && segment.arguments.is_none())
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => last_segment(ty).is_some_and(|segment| segment.ident == "Result"),
        ReturnType::Default => false,
    }
}

/// Attribute macro turning a function into an `Injectable` constructor.
///
/// `fn name(a: A, b: B) -> R` becomes `fn name() -> Injectable`. The
/// returned injectable is annotated with the parameter names `["a", "b"]`
/// (inferred, so strict injectors refuse it when it has parameters) and, when
/// invoked, calls the original body with the resolved arguments. Parameter
/// types are read the same way as `#[derive(Inject)]` fields. A `Result`
/// return type is propagated with `?`.
///
/// # Example
///
/// ```rust,ignore
/// #[injectable]
/// fn connection_string(host: Arc<String>, port: u16) -> String {
///     format!("{host}:{port}")
/// }
///
/// let injectable: Injectable = connection_string();
/// ```
#[proc_macro_attribute]
pub fn injectable(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(
            proc_macro2::Span::call_site(),
            "#[injectable] does not take arguments",
        )
        .into_compile_error()
        .into();
    }

    let item = parse_macro_input!(item as ItemFn);
    expand_injectable(item)
        .unwrap_or_else(syn::Error::into_compile_error)
        .into()
}

fn expand_injectable(item: ItemFn) -> syn::Result<TokenStream2> {
    let sig = &item.sig;
    if sig.asyncness.is_some() {
        return Err(syn::Error::new_spanned(sig.asyncness, "#[injectable] functions cannot be async"));
    }
    if !sig.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(&sig.generics, "#[injectable] functions cannot be generic"));
    }

    let mut params = Vec::new();
    let mut arguments = Vec::new();
    for (index, input) in sig.inputs.iter().enumerate() {
        let typed = match input {
            FnArg::Typed(typed) => typed,
            FnArg::Receiver(receiver) => {
                return Err(syn::Error::new_spanned(receiver, "#[injectable] functions cannot take self"));
            }
        };
        let ident = match typed.pat.as_ref() {
            Pat::Ident(pat) => &pat.ident,
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "#[injectable] parameters must be plain identifiers",
                ));
            }
        };
        params.push(ident.unraw().to_string());
        arguments.push(take_argument(&typed.ty, index));
    }

    let args_ident = if params.is_empty() {
        format_ident!("_args")
    } else {
        format_ident!("args")
    };
    let params = string_list(&params);
    let vis = &item.vis;
    let name = &sig.ident;
    let label = name.unraw().to_string();
    let docs: Vec<_> = item.attrs.iter().filter(|a| a.path().is_ident("doc")).collect();
    let body_fn = format_ident!("__{}_body", name.unraw());

    let mut inner = item.clone();
    inner.sig.ident = body_fn.clone();
    inner.vis = syn::Visibility::Inherited;
    inner.attrs.retain(|a| !a.path().is_ident("doc"));

    let call = if returns_result(&sig.output) {
        quote! { #body_fn(#(#arguments),*)? }
    } else {
        quote! { #body_fn(#(#arguments),*) }
    };

    Ok(quote! {
        #(#docs)*
        #vis fn #name() -> ::module_injector::Injectable {
            #inner

            ::module_injector::Injectable::inferred(
                #label,
                #params,
                |#args_ident: &::module_injector::Arguments| ::std::result::Result::Ok(#call),
            )
        }
    })
}
