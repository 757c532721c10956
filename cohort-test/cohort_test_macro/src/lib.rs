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

use proc_macro::TokenStream;

use quote::quote;
use syn::{parse_macro_input, ItemFn};

/// Marks a synchronous test that drives a Cohort environment.
///
/// The body runs on the test thread inside a `cohort_test` tracing span. A panic
/// hook records panics raised by the test thread itself; panics inside agent
/// handlers run on dispatcher threads and are left to the runtime.
#[proc_macro_attribute]
pub fn cohort_test(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let vis = &input.vis;
    let sig = &input.sig;
    let body = &input.block;
    let attrs = &input.attrs;
    let name = &sig.ident;
    let output = &sig.output;

    if sig.asyncness.is_some() {
        return syn::Error::new_spanned(sig.fn_token, "#[cohort_test] expects a synchronous fn")
            .to_compile_error()
            .into();
    }

    let inner_name = syn::Ident::new(&format!("__{}_body", name), name.span());

    let output_tokens = quote! {
        #[test]
        #(#attrs)*
        #vis fn #name() #output {
            use std::panic;
            use std::sync::atomic::{AtomicBool, Ordering};
            use std::sync::Arc;

            #[derive(Clone, Default)]
            struct PanicInfo {
                occurred: Arc<AtomicBool>,
                message: Arc<::cohort_test::__private::parking_lot::Mutex<Option<String>>>,
                location: Arc<::cohort_test::__private::parking_lot::Mutex<Option<String>>>,
            }

            let test_thread = std::thread::current().id();
            let panic_info = PanicInfo::default();
            let recorder = panic_info.clone();

            let orig_hook = panic::take_hook();
            panic::set_hook(Box::new(move |info| {
                if std::thread::current().id() == test_thread {
                    recorder.occurred.store(true, Ordering::SeqCst);
                    *recorder.message.lock() = info
                        .payload()
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| info.payload().downcast_ref::<String>().cloned());
                    *recorder.location.lock() = info
                        .location()
                        .map(|l| format!("{}:{}:{}", l.file(), l.line(), l.column()));
                    ::cohort_test::__private::tracing::error!(
                        "Panic: {}",
                        recorder
                            .message
                            .lock()
                            .clone()
                            .unwrap_or_else(|| "No error message".to_string())
                            .trim()
                            .replace('\n', " ")
                    );
                }
                orig_hook(info);
            }));

            let result = {
                let test_span = ::cohort_test::__private::tracing::info_span!("cohort_test", name = stringify!(#name));
                let _enter = test_span.enter();
                panic::catch_unwind(panic::AssertUnwindSafe(#inner_name))
            };

            match result {
                Ok(outcome) => outcome,
                Err(payload) => {
                    if panic_info.occurred.load(Ordering::SeqCst) {
                        let location = panic_info
                            .location
                            .lock()
                            .clone()
                            .unwrap_or_else(|| "unknown location".to_string());
                        let message = panic_info
                            .message
                            .lock()
                            .clone()
                            .unwrap_or_else(|| "No error message".to_string());
                        panic!("Panic at {}: {}", location, message.trim().replace('\n', " "));
                    }
                    panic::resume_unwind(payload)
                }
            }
        }

        fn #inner_name() #output #body
    };

    output_tokens.into()
}
