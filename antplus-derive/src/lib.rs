// Copyright 2023 Google LLC
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// https://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or https://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

extern crate proc_macro;

use proc_macro::TokenStream;
use quote::quote;

/// Derives the page-number accessor for a packed data-page struct.
///
/// The struct must carry a `data_page_number` field convertible to `u8`
/// (either a plain byte or a 7-bit `Integer` when the page shares byte 0
/// with the page-change toggle).
#[proc_macro_derive(DataPage)]
pub fn derive_data_page(input: TokenStream) -> TokenStream {
    let ast = syn::parse(input).unwrap();

    impl_data_page(&ast)
}

fn impl_data_page(ast: &syn::DeriveInput) -> TokenStream {
    let name = &ast.ident;
    let gen = quote! {
        impl #name {
            pub fn data_page_number(&self) -> u8 {
                self.data_page_number.into()
            }
        }
    };
    gen.into()
}
