//! Helper macros for ABI function generation.

/// Generate an exported `extern "C"` function.
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn frankensync_thing(arg: *mut Thing) -> c_int {
///         // body, already inside an unsafe block
///     }
/// }
/// ```
///
/// Expands to `#[unsafe(no_mangle)] pub unsafe extern "C" fn` with the given
/// signature. Handle validation is written out in each body.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) -> $ret {
            unsafe { $body }
        }
    };

    // Variant without return type (returns ())
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? )
        $body:block
    ) => {
        $(#[$meta])*
        #[unsafe(no_mangle)]
        #[allow(unused_unsafe)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}

#[allow(unused_imports)]
pub(crate) use abi_fn;
