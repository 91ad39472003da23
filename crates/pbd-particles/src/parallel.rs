//! Fork-join helpers.
//!
//! With the `parallel` feature these fan out over rayon's pool; without it
//! they run the same closures in index order.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Evaluate `f` for every index in `0..n`, collecting results in order.
pub fn map<T, F>(n: usize, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        (0..n).into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        (0..n).map(f).collect()
    }
}

/// Map over a slice, collecting results in order.
pub fn map_slice<S, T, F>(items: &[S], f: F) -> Vec<T>
where
    S: Sync,
    T: Send,
    F: Fn(&S) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        items.par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.iter().map(f).collect()
    }
}

/// Visit every element mutably together with its index.
pub fn for_each_mut<T, F>(items: &mut [T], f: F)
where
    T: Send,
    F: Fn(usize, &mut T) + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        items.par_iter_mut().enumerate().for_each(|(i, item)| f(i, item));
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.iter_mut().enumerate().for_each(|(i, item)| f(i, item));
    }
}

/// Consume owned work items, collecting results in order.
pub fn map_owned<S, T, F>(items: Vec<S>, f: F) -> Vec<T>
where
    S: Send,
    T: Send,
    F: Fn(S) -> T + Sync + Send,
{
    #[cfg(feature = "parallel")]
    {
        items.into_par_iter().map(f).collect()
    }
    #[cfg(not(feature = "parallel"))]
    {
        items.into_iter().map(f).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_preserves_order() {
        let squares = map(100, |i| i * i);
        assert_eq!(squares[7], 49);
        assert_eq!(squares.len(), 100);
    }

    #[test]
    fn for_each_mut_sees_indices() {
        let mut v = vec![0usize; 32];
        for_each_mut(&mut v, |i, x| *x = i + 1);
        assert!(v.iter().enumerate().all(|(i, &x)| x == i + 1));
    }

    #[test]
    fn map_owned_consumes() {
        let words = vec![String::from("a"), String::from("bb")];
        assert_eq!(map_owned(words, |s| s.len()), vec![1, 2]);
        assert_eq!(map_slice(&[1, 2, 3], |x| x * 2), vec![2, 4, 6]);
    }
}
