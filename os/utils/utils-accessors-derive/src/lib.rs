//! # Accessor Derive
//!
//! Derive macro for the builder-style accessors used on permission sets
//! (`LeafPermissions`, `Protection`, ...).

use proc_macro::TokenStream;
use quote::{ToTokens, format_ident, quote};
use syn::{Data, DeriveInput, Field, Fields, LitBool, parse_macro_input, spanned::Spanned};

/// Derive `.set_<field>(&mut self, value) -> &mut Self` and
/// `const .with_<field>(self, value) -> Self` for each **named** field.
///
/// Field attributes:
/// - `#[setters(skip)]` / `#[setters(skip = true)]`: generate nothing.
/// - `#[setters(get)]`: also generate `const .<field>(&self) -> Ty`
///   (the field type must be `Copy`).
///
/// # Example
///
/// ```
/// use utils_accessors_derive::Setters;
///
/// #[derive(Default, Setters)]
/// struct Prot {
///     #[setters(get)]
///     read: bool,
///     write: bool,
///     #[setters(skip)]
///     _reserved: u8,
/// }
///
/// let p = Prot::default().with_read(true);
/// assert!(p.read());
/// let mut q = p;
/// q.set_write(true).set_read(false);
/// assert!(q.write && !q.read());
/// ```
#[proc_macro_derive(Setters, attributes(setters))]
pub fn derive_generate_setters(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    expand(&input).unwrap_or_else(|e| e.to_compile_error().into())
}

fn expand(input: &DeriveInput) -> syn::Result<TokenStream> {
    let ident = &input.ident;
    let fields = match &input.data {
        Data::Struct(s) => match &s.fields {
            Fields::Named(n) => &n.named,
            Fields::Unnamed(u) => {
                return Err(syn::Error::new(u.span(), "Setters only supports named fields"));
            }
            Fields::Unit => {
                return Err(syn::Error::new(
                    ident.span(),
                    "Setters does not apply to unit structs",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new(
                ident.span(),
                "Setters can only be derived for structs",
            ));
        }
    };

    let mut methods = Vec::new();
    for field in fields {
        let options = FieldOptions::parse(field)?;
        if options.skip {
            continue;
        }
        methods.extend(field_methods(field, options));
    }

    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics #ident #ty_generics #where_clause {
            #(#methods)*
        }
    }
    .into())
}

fn field_methods(field: &Field, options: FieldOptions) -> Option<impl ToTokens> {
    let fname = field.ident.as_ref()?;
    let ty = &field.ty;
    let set_name = format_ident!("set_{}", fname);
    let with_name = format_ident!("with_{}", fname);

    let getter = options.get.then(|| {
        quote! {
            #[inline]
            #[must_use]
            pub const fn #fname(&self) -> #ty {
                self.#fname
            }
        }
    });

    Some(quote! {
        #getter

        #[inline]
        pub const fn #set_name(&mut self, value: #ty) -> &mut Self {
            self.#fname = value;
            self
        }

        #[inline]
        #[must_use]
        pub const fn #with_name(mut self, value: #ty) -> Self {
            self.#fname = value;
            self
        }
    })
}

#[derive(Default, Clone, Copy)]
struct FieldOptions {
    skip: bool,
    get: bool,
}

impl FieldOptions {
    fn parse(field: &Field) -> syn::Result<Self> {
        let mut options = Self::default();
        for attr in &field.attrs {
            if !attr.path().is_ident("setters") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    options.skip = flag_value(&meta)?;
                    Ok(())
                } else if meta.path.is_ident("get") {
                    options.get = flag_value(&meta)?;
                    Ok(())
                } else {
                    Err(meta.error("expected `skip` or `get`"))
                }
            })?;
        }
        Ok(options)
    }
}

/// `name` alone means `true`; `name = <bool>` is honored as written.
fn flag_value(meta: &syn::meta::ParseNestedMeta<'_>) -> syn::Result<bool> {
    if meta.input.is_empty() || meta.input.peek(syn::Token![,]) {
        return Ok(true);
    }
    let v: LitBool = meta.value()?.parse()?;
    Ok(v.value)
}
