//! Helper macros for ABI function generation.

/// Generate an exported `extern "C"` entry point.
///
/// ```ignore
/// abi_fn! {
///     /// Doc comment for the function.
///     fn ephemgate_thing(arg: c_int, err: *mut c_char, err_max_bytes: usize) -> c_int {
///         // body
///     }
/// }
/// ```
///
/// The body runs in an `unsafe` context so it can read caller pointers through
/// the helpers in `util`.
macro_rules! abi_fn {
    (
        $(#[$meta:meta])*
        fn $name:ident( $($arg:ident : $argty:ty),* $(,)? ) -> $ret:ty
        $body:block
    ) => {
        $(#[$meta])*
        #[allow(unused_unsafe)]
        #[unsafe(no_mangle)]
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
        #[allow(unused_unsafe)]
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $name( $($arg : $argty),* ) {
            unsafe { $body }
        }
    };
}

pub(crate) use abi_fn;
