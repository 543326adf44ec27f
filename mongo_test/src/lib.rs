use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{
    parse_macro_input, spanned::Spanned, FnArg, GenericArgument, ItemFn, Pat, PathArguments,
    Signature, Type,
};

/// Environment variable naming the MongoDB deployment tests run against. It
/// must be a replica set, as the store relies on transactions.
const URI_VAR: &str = "MONGODB_TEST_URI";

/// Transform an asynchronous test into a synchronous one, inject dependencies,
/// and ensure that its throwaway database is dropped regardless of how the
/// test terminates.
///
/// Injectable dependencies are [`crate::model::mongodb::MongoStore`],
/// [`mongodb::Database`], and [`crate::model::mongodb::Coll<T>`], all bound to
/// the same freshly named database. The test is skipped if `MONGODB_TEST_URI`
/// is not set.
#[proc_macro_attribute]
pub fn mongo_test(_args: TokenStream, input: TokenStream) -> TokenStream {
    let mut item_fn = parse_macro_input!(input as ItemFn);

    // Extract the injected arguments and reject invalid function signatures.
    let test_args = match check_sig(item_fn.sig.clone()) {
        Ok(args) => args,
        Err(err) => {
            return err.into_compile_error().into();
        }
    };

    // Rename the future so the test can have its original name.
    let name = item_fn.sig.ident.clone();
    let new_name = format_ident!("{}_fut", name);
    item_fn.sig.ident = new_name.clone();

    quote! {
        #[test]
        fn #name() {
            let uri = match std::env::var(#URI_VAR) {
                Ok(uri) => uri,
                Err(_) => {
                    eprintln!("skipping {}: {} is not set", stringify!(#name), #URI_VAR);
                    return;
                }
            };

            /// Test setup.
            async fn setup(uri: String) -> (crate::model::mongodb::MongoStore, ::mongodb::Database) {
                let client = ::mongodb::Client::with_uri_str(&uri).await.unwrap();
                let db_name = format!("test-{:08x}", ::rand::random::<u32>());
                let store = crate::model::mongodb::MongoStore::with_client(client, &db_name)
                    .await
                    .unwrap();
                let db = store.database().clone();
                (store, db)
            }

            /// The test itself.
            #item_fn

            /// Test cleanup.
            async fn cleanup(db: ::mongodb::Database) {
                db.drop(None).await.unwrap();
            }

            // Create an async runtime. We need a separate one for inside and
            // outside the `catch_unwind`. The inner one has room for tests
            // that race tasks against each other.
            let outer_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("test-setup-cleanup")
                .worker_threads(1)
                .enable_all()
                .build()
                .unwrap();
            let inner_runtime = rocket::tokio::runtime::Builder::new_multi_thread()
                .thread_name("store-worker-test-thread")
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();

            // Run the setup.
            let (store, db) = outer_runtime.block_on(setup(uri));

            // Run the test, catching any panics.
            // Use mutexes to safely transfer `!UnwindSafe` data.
            let store_mutex = std::sync::Mutex::new(store);
            let db_mutex = std::sync::Mutex::new(db.clone());
            let runtime_mutex = std::sync::Mutex::new(inner_runtime);
            let result = std::panic::catch_unwind(|| {
                let store = store_mutex.into_inner().unwrap();
                let db = db_mutex.into_inner().unwrap();
                let runtime = runtime_mutex.into_inner().unwrap();

                runtime.block_on(#new_name(#(#test_args),*));
            });

            // Run the cleanup.
            outer_runtime.block_on(cleanup(db));

            // If the test panicked, re-raise the panic.
            if let Err(cause) = result {
                std::panic::panic_any(cause);
            }
        }
    }
    .into()
}

/// Ensure the wrapped test is async, and map each parameter to the expression
/// that provides it.
fn check_sig(sig: Signature) -> Result<Vec<TokenStream2>, syn::Error> {
    if sig.asyncness.is_none() {
        return Err(syn::Error::new(sig.span(), "Test must be marked `async`"));
    }

    let mut has_store = false;
    let mut has_db = false;
    let mut args = vec![];

    for input in &sig.inputs {
        if let FnArg::Typed(pat_type) = input {
            if let (Pat::Ident(_), Type::Path(type_path)) = (&*pat_type.pat, &*pat_type.ty) {
                if let Some(last) = type_path.path.segments.last() {
                    if last.ident == "MongoStore" {
                        if has_store {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `MongoStore`",
                            ));
                        }
                        has_store = true;
                        args.push(quote! { store.clone() });
                        continue;
                    } else if last.ident == "Database" {
                        if has_db {
                            return Err(syn::Error::new(
                                input.span(),
                                "Test cannot accept more than one `mongodb::Database`",
                            ));
                        }
                        has_db = true;
                        args.push(quote! { db.clone() });
                        continue;
                    } else if last.ident == "Coll" {
                        if let PathArguments::AngleBracketed(generics) = &last.arguments {
                            if let Some(GenericArgument::Type(ty)) = generics.args.first() {
                                args.push(quote! {
                                    crate::model::mongodb::Coll::<#ty>::from_db(&db)
                                });
                                continue;
                            }
                        }
                    }
                }
            }
        }

        return Err(syn::Error::new(
            input.span(),
            "Expected one of `store: MongoStore`, `db: Database` or `collection: Coll<T>`",
        ));
    }

    Ok(args)
}
