use darling::Error;
use darling::ast::NestedMeta;
use quote::quote;
use syn::{Data, DeriveInput, Fields, ItemStruct, parse_macro_input};

use proc_macro::TokenStream;

/// Serializes every field in declaration order through `crate::byteorder`.
#[proc_macro_derive(ToBytes)]
pub fn derive_to_bytes(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    let name = input.ident;

    let fields: Vec<syn::Member> = match input.data {
        Data::Struct(ref s) => match s.fields {
            Fields::Named(ref nf) => nf
                .named
                .iter()
                .filter_map(|f| f.ident.clone())
                .map(syn::Member::from)
                .collect(),
            Fields::Unnamed(ref uf) => uf
                .unnamed
                .iter()
                .enumerate()
                .map(|(i, _)| syn::Index::from(i).into())
                .collect(),
            Fields::Unit => Vec::new(),
        },
        _ => {
            return TokenStream::from(
                syn::Error::new_spanned(&name, "ToBytes can only be derived for structs")
                    .to_compile_error(),
            );
        }
    };

    let expanded = quote! {
        impl crate::byteorder::WriteBytesBe for #name {
            fn write_be(&self, _dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesBe::write_be(&self.#fields, _dst); )*
            }
        }

        impl crate::byteorder::WriteBytesLe for #name {
            fn write_le(&self, _dst: &mut Vec<u8>) {
                #( crate::byteorder::WriteBytesLe::write_le(&self.#fields, _dst); )*
            }
        }
    };

    TokenStream::from(expanded)
}

/// Tags a struct as an NRBF record with the given one-byte record type.
///
/// The record body is the little-endian serialization of the struct, so the
/// struct must also derive `ToBytes`.
#[proc_macro_attribute]
pub fn nrbf_record(attr: TokenStream, item: TokenStream) -> TokenStream {
    let args = match NestedMeta::parse_meta_list(attr.into()) {
        Ok(v) => v,
        Err(e) => {
            return TokenStream::from(Error::from(e).write_errors());
        }
    };

    let record_type = match args.first() {
        Some(NestedMeta::Lit(syn::Lit::Int(lit))) => match lit.base10_parse::<u8>() {
            Ok(v) => v,
            Err(e) => return TokenStream::from(e.to_compile_error()),
        },
        Some(other) => {
            return TokenStream::from(
                syn::Error::new_spanned(other, "nrbf_record expects an integer, e.g. 0x0C")
                    .to_compile_error(),
            );
        }
        None => {
            return TokenStream::from(
                syn::Error::new(
                    proc_macro::Span::call_site().into(),
                    "nrbf_record expects a record type, e.g. #[nrbf_record(0x0C)]",
                )
                .to_compile_error(),
            );
        }
    };

    let input = parse_macro_input!(item as ItemStruct);
    let name = &input.ident;

    let expanded = quote! {
        #input

        impl NrbfRecord for #name {
            const RECORD_TYPE: u8 = #record_type;

            fn record_data(&self) -> Vec<u8> {
                let mut vec = Vec::new();
                crate::byteorder::WriteBytesLe::write_le(self, &mut vec);
                vec
            }
        }
    };
    TokenStream::from(expanded)
}
