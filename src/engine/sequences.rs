use num_bigint::BigInt;

/// n-th Fibonacci number by plain double recursion.
///
/// Exponential in `n`; callers bound `n` before calling and run it off the
/// async executor. Values of `n <= 1` are returned as-is.
pub fn fibonacci(n: i64) -> i64 {
    if n <= 1 {
        return n;
    }
    fibonacci(n - 1) + fibonacci(n - 2)
}

/// `n!` with arbitrary precision, `0! == 1`
pub fn factorial(n: u64) -> BigInt {
    let mut product = BigInt::from(1u32);
    for i in 2..=n {
        product *= i;
    }
    product
}
