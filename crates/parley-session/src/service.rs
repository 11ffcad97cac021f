//! Interface declaration.
//!
//! [`interface!`] turns one declared method list into the three faces of an
//! interface: the service trait a server implements, the client proxy that
//! marshals calls onto a [`Connection`](crate::Connection), and the server
//! dispatcher that routes inbound requests by [`MethodId`](crate::MethodId).
//!
//! Method ids are the FNV-1a hash of the method's name, computed at compile
//! time; a declaration whose names collide fails to build.
//!
//! Three method forms are accepted:
//!
//! - `async fn name(args...) -> Ret;` — a request/response method. The
//!   server implements `fn name(&self, args...) -> impl Future<Output =
//!   Result<Ret, ErrorCode>> + Send`; the client gets
//!   `async fn name(&self, args...) -> Result<Ret, CallError>`.
//! - `async fn name(args...);` — the same with a unit result (empty
//!   response payload).
//! - `fn name(args...);` — fire-and-forget: the server implements a
//!   synchronous `fn name(&self, args...)` and no response is ever sent.
//!
//! ```
//! use parley_session::interface;
//!
//! interface! {
//!     /// Arithmetic over the wire.
//!     pub trait Calculator;
//!     pub client CalculatorClient;
//!     pub dispatcher CalculatorDispatcher;
//!     methods {
//!         async fn simple_sum(a: i32, b: i32) -> i32;
//!         fn send_telemetry_event(event: String);
//!     }
//! }
//! ```

/// Declare an interface: a service trait, a client proxy and a server
/// dispatcher sharing one method list. See the [module docs](self).
#[macro_export]
macro_rules! interface {
    (
        $(#[$trait_meta:meta])*
        $tvis:vis trait $trait_name:ident;
        $(#[$client_meta:meta])*
        $cvis:vis client $client:ident;
        $(#[$dispatcher_meta:meta])*
        $dvis:vis dispatcher $dispatcher:ident;
        methods { $($methods:tt)* }
    ) => {
        $crate::__interface_trait! {
            [$(#[$trait_meta])*] [$tvis] [$trait_name] $($methods)*
        }
        $crate::__interface_client! {
            [$(#[$client_meta])*] [$cvis] [$client] [$($methods)*] $($methods)*
        }
        $crate::__interface_dispatcher! {
            [$(#[$dispatcher_meta])*] [$dvis] [$dispatcher] [$trait_name] [$($methods)*] $($methods)*
        }
    };
}

// ============================================================================
// Service trait
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __interface_trait {
    ([$($meta:tt)*] [$vis:vis] [$name:ident] $($methods:tt)*) => {
        $crate::__interface_trait!(@munch [$($meta)*] [$vis] [$name] [] $($methods)*);
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$name:ident] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        $crate::__interface_trait!(@munch [$($meta)*] [$vis] [$name]
            [$($acc)*
                $(#[$mmeta])*
                fn $method(&self $(, $arg: $ty)*)
                    -> impl ::core::future::Future<
                        Output = ::core::result::Result<$ret, $crate::ErrorCode>,
                    > + Send;
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$name:ident] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_trait!(@munch [$($meta)*] [$vis] [$name]
            [$($acc)*
                $(#[$mmeta])*
                fn $method(&self $(, $arg: $ty)*)
                    -> impl ::core::future::Future<
                        Output = ::core::result::Result<(), $crate::ErrorCode>,
                    > + Send;
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$name:ident] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_trait!(@munch [$($meta)*] [$vis] [$name]
            [$($acc)*
                $(#[$mmeta])*
                fn $method(&self $(, $arg: $ty)*);
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$name:ident] [$($acc:tt)*]) => {
        $($meta)*
        $vis trait $name: Send + Sync + 'static {
            $($acc)*
        }
    };
}

// ============================================================================
// Client proxy
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __interface_client {
    ([$($meta:tt)*] [$vis:vis] [$client:ident] [$($copy:tt)*] $($methods:tt)*) => {
        $crate::__interface_client!(@munch [$($meta)*] [$vis] [$client] [$($copy)*] [] $($methods)*);
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$client:ident] [$($copy:tt)*] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        $crate::__interface_client!(@munch [$($meta)*] [$vis] [$client] [$($copy)*]
            [$($acc)*
                $(#[$mmeta])*
                pub async fn $method(&self $(, $arg: $ty)*)
                    -> ::core::result::Result<$ret, $crate::CallError>
                {
                    const METHOD: $crate::MethodId =
                        $crate::MethodId::from_name(stringify!($method));
                    let state = ::std::sync::Arc::clone(self.connection.serializer_state());
                    let payload = {
                        #[allow(unused_mut)]
                        let mut writer = $crate::Writer::with_state(&state);
                        $(writer.write(&$arg);)*
                        writer.into_payload()
                    };
                    let response = self.connection.call(METHOD, payload).await?;
                    let mut reader = $crate::Reader::with_state(&response, &state);
                    Ok(reader.read()?)
                }
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$client:ident] [$($copy:tt)*] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_client!(@munch [$($meta)*] [$vis] [$client] [$($copy)*]
            [$($acc)*
                $(#[$mmeta])*
                pub async fn $method(&self $(, $arg: $ty)*)
                    -> ::core::result::Result<(), $crate::CallError>
                {
                    const METHOD: $crate::MethodId =
                        $crate::MethodId::from_name(stringify!($method));
                    let state = ::std::sync::Arc::clone(self.connection.serializer_state());
                    let payload = {
                        #[allow(unused_mut)]
                        let mut writer = $crate::Writer::with_state(&state);
                        $(writer.write(&$arg);)*
                        writer.into_payload()
                    };
                    let _response = self.connection.call(METHOD, payload).await?;
                    Ok(())
                }
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$client:ident] [$($copy:tt)*] [$($acc:tt)*]
        $(#[$mmeta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_client!(@munch [$($meta)*] [$vis] [$client] [$($copy)*]
            [$($acc)*
                $(#[$mmeta])*
                pub fn $method(&self $(, $arg: $ty)*)
                    -> ::core::result::Result<(), $crate::CallError>
                {
                    const METHOD: $crate::MethodId =
                        $crate::MethodId::from_name(stringify!($method));
                    let state = ::std::sync::Arc::clone(self.connection.serializer_state());
                    let payload = {
                        #[allow(unused_mut)]
                        let mut writer = $crate::Writer::with_state(&state);
                        $(writer.write(&$arg);)*
                        writer.into_payload()
                    };
                    self.connection.post(METHOD, payload)
                }
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$client:ident] [$($copy:tt)*] [$($acc:tt)*]) => {
        $($meta)*
        #[derive(Clone)]
        $vis struct $client {
            connection: $crate::Connection,
        }

        impl $client {
            /// The connection this proxy marshals calls onto.
            pub fn connection(&self) -> &$crate::Connection {
                &self.connection
            }

            $($acc)*
        }

        impl $crate::ClientMarshaller for $client {
            const ONLY_VOID_METHODS: bool = $crate::__interface_only_void!($($copy)*);

            fn bind(connection: &$crate::Connection) -> Self {
                Self {
                    connection: connection.clone(),
                }
            }
        }
    };
}

// ============================================================================
// Server dispatcher
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __interface_dispatcher {
    ([$($meta:tt)*] [$vis:vis] [$dispatcher:ident] [$trait_name:ident] [$($copy:tt)*] $($methods:tt)*) => {
        $crate::__interface_dispatcher!(
            @munch [$($meta)*] [$vis] [$dispatcher] [$trait_name] [$($copy)*] [] [] $($methods)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$dispatcher:ident] [$trait_name:ident] [$($copy:tt)*]
        [$($fns:tt)*] [$($entries:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        $crate::__interface_dispatcher!(@munch [$($meta)*] [$vis] [$dispatcher] [$trait_name] [$($copy)*]
            [$($fns)*
                fn $method(
                    service: &::std::sync::Arc<S>,
                    payload: $crate::Payload,
                    state: ::std::sync::Arc<$crate::SerializerState>,
                ) -> $crate::BoxFuture<
                    'static,
                    ::core::result::Result<$crate::Payload, $crate::ErrorCode>,
                > {
                    let service = ::std::sync::Arc::clone(service);
                    $crate::dispatch_unary(payload, state, move |($($arg,)*): ($($ty,)*)| async move {
                        service.$method($($arg),*).await
                    })
                }
            ]
            [$($entries)*
                $crate::MethodTableEntry {
                    id: $crate::MethodId::from_name(stringify!($method)),
                    run: Self::$method,
                    run_void: Self::__skip_void,
                },
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$dispatcher:ident] [$trait_name:ident] [$($copy:tt)*]
        [$($fns:tt)*] [$($entries:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_dispatcher!(@munch [$($meta)*] [$vis] [$dispatcher] [$trait_name] [$($copy)*]
            [$($fns)*
                fn $method(
                    service: &::std::sync::Arc<S>,
                    payload: $crate::Payload,
                    state: ::std::sync::Arc<$crate::SerializerState>,
                ) -> $crate::BoxFuture<
                    'static,
                    ::core::result::Result<$crate::Payload, $crate::ErrorCode>,
                > {
                    let service = ::std::sync::Arc::clone(service);
                    $crate::dispatch_unary(payload, state, move |($($arg,)*): ($($ty,)*)| async move {
                        service.$method($($arg),*).await
                    })
                }
            ]
            [$($entries)*
                $crate::MethodTableEntry {
                    id: $crate::MethodId::from_name(stringify!($method)),
                    run: Self::$method,
                    run_void: Self::__skip_void,
                },
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$dispatcher:ident] [$trait_name:ident] [$($copy:tt)*]
        [$($fns:tt)*] [$($entries:tt)*]
        $(#[$mmeta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_dispatcher!(@munch [$($meta)*] [$vis] [$dispatcher] [$trait_name] [$($copy)*]
            [$($fns)*
                fn $method(
                    service: &::std::sync::Arc<S>,
                    payload: $crate::Payload,
                    state: ::std::sync::Arc<$crate::SerializerState>,
                ) -> ::core::result::Result<(), $crate::ErrorCode> {
                    let service = ::std::sync::Arc::clone(service);
                    $crate::dispatch_void(payload, state, move |($($arg,)*): ($($ty,)*)| {
                        service.$method($($arg),*)
                    })
                }
            ]
            [$($entries)*
                $crate::MethodTableEntry {
                    id: $crate::MethodId::from_name(stringify!($method)),
                    run: Self::__skip_request,
                    run_void: Self::$method,
                },
            ]
            $($rest)*
        );
    };

    (@munch [$($meta:tt)*] [$vis:vis] [$dispatcher:ident] [$trait_name:ident] [$($copy:tt)*]
        [$($fns:tt)*] [$($entries:tt)*]
    ) => {
        $($meta)*
        $vis struct $dispatcher<S> {
            service: ::std::sync::Arc<S>,
            table: ::std::vec::Vec<$crate::MethodTableEntry<S>>,
        }

        impl<S: $trait_name> $dispatcher<S> {
            /// Wrap a service implementation, building the method table
            /// sorted by id.
            pub fn new(service: S) -> Self {
                let mut table = ::std::vec![$($entries)*];
                table.sort_by_key(|entry| entry.id);
                Self {
                    service: ::std::sync::Arc::new(service),
                    table,
                }
            }

            /// The wrapped service implementation.
            pub fn service(&self) -> &::std::sync::Arc<S> {
                &self.service
            }

            fn lookup(&self, method: $crate::MethodId) -> ::core::option::Option<&$crate::MethodTableEntry<S>> {
                self.table
                    .binary_search_by_key(&method, |entry| entry.id)
                    .ok()
                    .map(|index| &self.table[index])
            }

            // A request aimed at a fire-and-forget method: answer an empty
            // payload without invoking anything.
            fn __skip_request(
                _service: &::std::sync::Arc<S>,
                _payload: $crate::Payload,
                _state: ::std::sync::Arc<$crate::SerializerState>,
            ) -> $crate::BoxFuture<
                'static,
                ::core::result::Result<$crate::Payload, $crate::ErrorCode>,
            > {
                ::std::boxed::Box::pin(::core::future::ready(Ok($crate::Payload::new())))
            }

            // A fire-and-forget aimed at a request/response method: no-op.
            fn __skip_void(
                _service: &::std::sync::Arc<S>,
                _payload: $crate::Payload,
                _state: ::std::sync::Arc<$crate::SerializerState>,
            ) -> ::core::result::Result<(), $crate::ErrorCode> {
                Ok(())
            }

            $($fns)*
        }

        impl<S: $trait_name> $crate::ServerDispatcher for $dispatcher<S> {
            fn only_void_methods(&self) -> bool {
                $crate::__interface_only_void!($($copy)*)
            }

            fn dispatch(
                &self,
                method: $crate::MethodId,
                payload: $crate::Payload,
                state: ::std::sync::Arc<$crate::SerializerState>,
            ) -> $crate::BoxFuture<
                'static,
                ::core::result::Result<$crate::Payload, $crate::ErrorCode>,
            > {
                match self.lookup(method) {
                    Some(entry) => (entry.run)(&self.service, payload, state),
                    None => ::std::boxed::Box::pin(::core::future::ready(Err(
                        $crate::ErrorCode::NOT_IMPL,
                    ))),
                }
            }

            fn void_dispatch(
                &self,
                method: $crate::MethodId,
                payload: $crate::Payload,
                state: ::std::sync::Arc<$crate::SerializerState>,
            ) -> ::core::result::Result<(), $crate::ErrorCode> {
                match self.lookup(method) {
                    Some(entry) => (entry.run_void)(&self.service, payload, state),
                    None => Err($crate::ErrorCode::NOT_IMPL),
                }
            }
        }

        const _: () = {
            $crate::assert_distinct_method_ids(&$crate::__interface_method_ids!([] $($copy)*));
        };
    };
}

// ============================================================================
// Method-list folds
// ============================================================================

#[doc(hidden)]
#[macro_export]
macro_rules! __interface_only_void {
    () => { true };
    (
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        false && $crate::__interface_only_void!($($rest)*)
    };
    (
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        false && $crate::__interface_only_void!($($rest)*)
    };
    (
        $(#[$mmeta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        true && $crate::__interface_only_void!($($rest)*)
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __interface_method_ids {
    ([$($acc:tt)*]) => { [$($acc)*] };
    ([$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?) -> $ret:ty;
        $($rest:tt)*
    ) => {
        $crate::__interface_method_ids!(
            [$($acc)* $crate::MethodId::from_name(stringify!($method)),] $($rest)*
        )
    };
    ([$($acc:tt)*]
        $(#[$mmeta:meta])*
        async fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_method_ids!(
            [$($acc)* $crate::MethodId::from_name(stringify!($method)),] $($rest)*
        )
    };
    ([$($acc:tt)*]
        $(#[$mmeta:meta])*
        fn $method:ident($($arg:ident: $ty:ty),* $(,)?);
        $($rest:tt)*
    ) => {
        $crate::__interface_method_ids!(
            [$($acc)* $crate::MethodId::from_name(stringify!($method)),] $($rest)*
        )
    };
}
