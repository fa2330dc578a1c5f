// record.rs - Implementation module
use heck::ToShoutySnakeCase;
use proc_macro::TokenStream;
use quote::quote;
use syn::{Data, DeriveInput, Fields, LitStr, Visibility, parse_macro_input};

/// Options collected from a field's `#[record(...)]` attributes.
#[derive(Debug, Default, PartialEq, Eq)]
struct FieldOptions {
    key: bool,
    concurrency_token: bool,
    skip: bool,
}

/// Internal implementation of the Record derive macro.
pub(crate) fn derive_record_impl(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);

    match generate_record_impl(&input) {
        Ok(tokens) => TokenStream::from(tokens),
        Err(err) => TokenStream::from(err.to_compile_error()),
    }
}

/// Generates the static model and the `Record` / `ActorState` impls.
fn generate_record_impl(input: &DeriveInput) -> syn::Result<proc_macro2::TokenStream> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Record can not be derived for generic types",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Record can only be derived for structs with named fields",
                ));
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Record can only be derived for structs",
            ));
        }
    };

    let record_name = find_record_name(input)?.unwrap_or_else(|| name.to_string());
    let model_ident = create_model_ident(name);

    let mut properties = Vec::new();
    let mut keys = Vec::new();

    for field in fields {
        let options = field_options(field)?;
        if options.skip {
            continue;
        }

        let Some(ident) = &field.ident else {
            continue;
        };
        let field_name = ident.to_string();

        let mut property = quote! {
            ::actorstate::record::Property::new(
                #field_name,
                |r: &#name| &r.#ident,
                |r: &mut #name| &mut r.#ident,
            )
        };

        if !matches!(field.vis, Visibility::Public(_)) {
            property = quote! { #property.private() };
        }

        if options.concurrency_token {
            property = quote! { #property.concurrency_token() };
        }

        if options.key {
            keys.push(field_name);
        }

        properties.push(property);
    }

    let primary_key = if keys.is_empty() {
        quote! {}
    } else {
        quote! { .primary_key([#(#keys),*]) }
    };

    let expanded = quote! {
        static #model_ident: ::std::sync::LazyLock<::actorstate::record::RecordModel<#name>> =
            ::std::sync::LazyLock::new(|| {
                ::actorstate::record::RecordModel::builder(#record_name)
                    #(.property(#properties))*
                    #primary_key
                    .build()
            });

        impl ::actorstate::record::Record for #name {
            fn model() -> &'static ::actorstate::record::RecordModel<Self> {
                &#model_ident
            }
        }

        impl ::actorstate::resolver::ActorState for #name {
            type Record = Self;
        }
    };

    Ok(expanded)
}

/// Creates a unique model identifier for the given struct name.
fn create_model_ident(name: &syn::Ident) -> syn::Ident {
    syn::Ident::new(
        &format!("{}_RECORD_MODEL", name.to_string().to_shouty_snake_case()),
        name.span(),
    )
}

/// Finds the record name from `#[record(name = "...")]` on the struct.
fn find_record_name(input: &DeriveInput) -> syn::Result<Option<String>> {
    let mut record_name = None;

    for attr in &input.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("name") {
                let value: LitStr = meta.value()?.parse()?;
                record_name = Some(value.value());
                Ok(())
            } else {
                Err(meta.error("unsupported record attribute, expected `name = \"...\"`"))
            }
        })?;
    }

    Ok(record_name)
}

fn field_options(field: &syn::Field) -> syn::Result<FieldOptions> {
    let mut options = FieldOptions::default();

    for attr in &field.attrs {
        if !attr.path().is_ident("record") {
            continue;
        }

        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("key") {
                options.key = true;
            } else if meta.path.is_ident("concurrency_token") {
                options.concurrency_token = true;
            } else if meta.path.is_ident("skip") {
                options.skip = true;
            } else {
                return Err(meta.error(
                    "unsupported record attribute, expected `key`, `concurrency_token` or `skip`",
                ));
            }
            Ok(())
        })?;
    }

    Ok(options)
}
