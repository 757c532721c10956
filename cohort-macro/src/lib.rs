/*
 * Copyright (c) 2024. Govcraft
 *
 * Licensed under either of
 *   * Apache License, Version 2.0 (the "License");
 *     you may not use this file except in compliance with the License.
 *     You may obtain a copy of the License at http://www.apache.org/licenses/LICENSE-2.0
 *   * MIT license: http://opensource.org/licenses/MIT
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the applicable License for the specific language governing permissions and
 * limitations under that License.
 */
#![forbid(unsafe_code)]

//! Procedural macros for the Cohort agent runtime.
//!
//! * [`cohort_message`] prepares a payload type for delivery through mboxes.
//! * [`cohort_signal`] turns a unit struct into a payload-less signal.
//! * [`cohort_agent`] prepares an agent model type.
//!
//! ```ignore
//! #[cohort_message]
//! pub struct Deposit {
//!     pub amount: u64,
//! }
//!
//! #[cohort_signal]
//! pub struct Tick;
//!
//! #[cohort_agent]
//! pub struct Account {
//!     balance: u64,
//! }
//! ```

use proc_macro::TokenStream;

use quote::{format_ident, quote};
use syn::{parse_macro_input, Data, DeriveInput, Fields};

fn has_derive(input: &DeriveInput, trait_name: &str) -> bool {
    input.attrs.iter().any(|attr| {
        if attr.path().is_ident("derive") {
            let mut found = false;
            let _ = attr.parse_nested_meta(|meta| {
                if meta.path.is_ident(trait_name) {
                    found = true;
                }
                Ok(())
            });
            found
        } else {
            false
        }
    })
}

fn missing_derives(input: &DeriveInput, wanted: &[&str]) -> proc_macro2::TokenStream {
    let traits: Vec<_> = wanted
        .iter()
        .filter(|name| !has_derive(input, name))
        .map(|name| format_ident!("{}", name))
        .collect();
    if traits.is_empty() {
        quote!()
    } else {
        quote!(#[derive(#(#traits),*)])
    }
}

fn has_flag(attr: &TokenStream, flag: &str) -> bool {
    attr.to_string().split(',').any(|part| part.trim() == flag)
}

/// Prepares a type for use as a Cohort message.
///
/// Adds `#[derive(Clone, Debug)]` where missing, implements
/// `cohort::prelude::Message`, and checks at compile time that the type is
/// `Send + Sync + 'static`, which every message shared between subscribers
/// must be.
#[proc_macro_attribute]
pub fn cohort_message(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let derives = missing_derives(&input, &["Clone", "Debug"]);
    let assert_ident = format_ident!("_AssertCohortMessage_{}", name);

    let expanded = quote! {
        #derives
        #input

        impl #impl_generics ::cohort::prelude::Message for #name #ty_generics #where_clause {}

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}

/// Declares a signal: a message type without payload.
///
/// Only unit structs are accepted. The macro derives `Clone`, `Copy` and
/// `Debug` where missing and implements `cohort::prelude::Signal`.
#[proc_macro_attribute]
pub fn cohort_signal(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as DeriveInput);

    let is_unit = matches!(&input.data, Data::Struct(data) if matches!(data.fields, Fields::Unit));
    if !is_unit || !input.generics.params.is_empty() {
        return syn::Error::new_spanned(
            &input.ident,
            "#[cohort_signal] can only be applied to a non-generic unit struct",
        )
        .to_compile_error()
        .into();
    }

    let name = &input.ident;
    let derives = missing_derives(&input, &["Clone", "Copy", "Debug"]);

    let expanded = quote! {
        #derives
        #input

        impl ::cohort::prelude::Signal for #name {}
    };

    TokenStream::from(expanded)
}

/// Prepares a type for use as an agent model.
///
/// Derives `Default` and `Debug` where missing (pass `no_default` to supply
/// `Default` by hand) and checks that the model is `Send + Sync + 'static`.
/// Thread-safe handlers share the model between worker threads, hence `Sync`.
#[proc_macro_attribute]
pub fn cohort_agent(attr: TokenStream, item: TokenStream) -> TokenStream {
    let no_default = has_flag(&attr, "no_default");
    let input = parse_macro_input!(item as DeriveInput);

    let name = &input.ident;
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
    let derives = if no_default {
        missing_derives(&input, &["Debug"])
    } else {
        missing_derives(&input, &["Default", "Debug"])
    };
    let assert_ident = format_ident!("_AssertCohortAgent_{}", name);

    let expanded = quote! {
        #derives
        #input

        #[doc(hidden)]
        #[allow(dead_code, non_camel_case_types, non_snake_case, clippy::needless_lifetimes)]
        const _: () = {
            fn #assert_ident #impl_generics () #where_clause {
                fn assert_bounds<T: Send + Sync + 'static>() {}
                assert_bounds::<#name #ty_generics>();
            }
        };
    };

    TokenStream::from(expanded)
}
