//! Matrix capability surface and lazy views.
//!
//! Backpropagation performs several large matrix multiplies per layer per
//! epoch. The wrappers in this module implement the read surface of a dense
//! matrix (`rows`/`cols`/`at`) over an underlying matrix without copying it:
//!
//! - [`OnesAdded`] — prepends a constant column of ones, so the bias term
//!   folds into a single multiply against weights whose row 0 holds the
//!   bias weights.
//! - [`Applied`] — applies a scalar function per element on read, so an
//!   activation derivative can participate in an elementwise product
//!   without an intermediate matrix.
//! - [`BiasTrimmedT`] — transpose with the bias row of the underlying
//!   matrix dropped, used by the backward recursion against the next
//!   layer's weights.
//! - [`TransposedRef`] — plain transpose, used by the loss gradient
//!   `Xᵀ·Ydiff`.
//!
//! Every access is O(1) indirection; nothing is materialized. The products
//! themselves are written into caller-owned buffers so the training hot
//! loop stays allocation-free.

use ndarray::Array2;

/// Read surface of a dense 2-D matrix.
///
/// Implemented by [`Array2<f64>`] and by the lazy views in this module, so
/// a multiply can consume either storage or a view of it.
pub trait MatrixRef {
    fn rows(&self) -> usize;
    fn cols(&self) -> usize;
    fn at(&self, r: usize, c: usize) -> f64;
}

impl MatrixRef for Array2<f64> {
    #[inline]
    fn rows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.ncols()
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self[[r, c]]
    }
}

impl MatrixRef for ndarray::ArrayView2<'_, f64> {
    #[inline]
    fn rows(&self) -> usize {
        self.nrows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.ncols()
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self[[r, c]]
    }
}

/// Bias-augmented view: logical column 0 is the constant 1.0, columns >= 1
/// mirror the underlying matrix.
pub struct OnesAdded<'a, M: MatrixRef + ?Sized>(pub &'a M);

impl<M: MatrixRef + ?Sized> MatrixRef for OnesAdded<'_, M> {
    #[inline]
    fn rows(&self) -> usize {
        self.0.rows()
    }

    #[inline]
    fn cols(&self) -> usize {
        1 + self.0.cols()
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        if c == 0 {
            1.0
        } else {
            self.0.at(r, c - 1)
        }
    }
}

/// Elementwise-mapped view: `at(r, c)` returns `f(inner.at(r, c))`.
pub struct Applied<'a, M: MatrixRef + ?Sized, F: Fn(f64) -> f64> {
    inner: &'a M,
    f: F,
}

impl<'a, M: MatrixRef + ?Sized, F: Fn(f64) -> f64> Applied<'a, M, F> {
    pub fn new(inner: &'a M, f: F) -> Self {
        Self { inner, f }
    }
}

impl<M: MatrixRef + ?Sized, F: Fn(f64) -> f64> MatrixRef for Applied<'_, M, F> {
    #[inline]
    fn rows(&self) -> usize {
        self.inner.rows()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.inner.cols()
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        (self.f)(self.inner.at(r, c))
    }
}

/// Transpose of the underlying matrix with its bias row (row 0) dropped.
///
/// For weights of shape `(1 + inputs, outputs)` this reads as the
/// `(outputs, inputs)` matrix the backward recursion multiplies against.
pub struct BiasTrimmedT<'a, M: MatrixRef + ?Sized>(pub &'a M);

impl<M: MatrixRef + ?Sized> MatrixRef for BiasTrimmedT<'_, M> {
    #[inline]
    fn rows(&self) -> usize {
        self.0.cols()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.0.rows() - 1
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self.0.at(1 + c, r)
    }
}

/// Plain transpose view.
pub struct TransposedRef<'a, M: MatrixRef + ?Sized>(pub &'a M);

impl<M: MatrixRef + ?Sized> MatrixRef for TransposedRef<'_, M> {
    #[inline]
    fn rows(&self) -> usize {
        self.0.cols()
    }

    #[inline]
    fn cols(&self) -> usize {
        self.0.rows()
    }

    #[inline]
    fn at(&self, r: usize, c: usize) -> f64 {
        self.0.at(c, r)
    }
}

/// `out = a × b`, overwriting `out`.
///
/// Shape contract (programmer error, panics): `a.cols() == b.rows()` and
/// `out` has shape `(a.rows(), b.cols())`.
pub fn mat_mul_into<A, B>(out: &mut Array2<f64>, a: &A, b: &B)
where
    A: MatrixRef + ?Sized,
    B: MatrixRef + ?Sized,
{
    let (n, k) = (a.rows(), a.cols());
    let p = b.cols();
    assert_eq!(
        k,
        b.rows(),
        "mat_mul_into: lhs cols {} do not match rhs rows {}",
        k,
        b.rows()
    );
    assert_eq!(
        out.dim(),
        (n, p),
        "mat_mul_into: out has shape {:?}, product has ({n}, {p})",
        out.dim()
    );

    out.fill(0.0);
    for r in 0..n {
        for i in 0..k {
            let av = a.at(r, i);
            if av == 0.0 {
                continue;
            }
            for c in 0..p {
                out[[r, c]] += av * b.at(i, c);
            }
        }
    }
}

/// `buf[r, c] *= m.at(r, c)` for every element.
pub fn mul_elem_assign<M>(buf: &mut Array2<f64>, m: &M)
where
    M: MatrixRef + ?Sized,
{
    assert_eq!(
        buf.dim(),
        (m.rows(), m.cols()),
        "mul_elem_assign: buf has shape {:?}, operand has ({}, {})",
        buf.dim(),
        m.rows(),
        m.cols()
    );
    for ((r, c), v) in buf.indexed_iter_mut() {
        *v *= m.at(r, c);
    }
}

/// `out = a - b`, overwriting `out`.
pub fn sub_into<A, B>(out: &mut Array2<f64>, a: &A, b: &B)
where
    A: MatrixRef + ?Sized,
    B: MatrixRef + ?Sized,
{
    assert_eq!((a.rows(), a.cols()), (b.rows(), b.cols()));
    assert_eq!(out.dim(), (a.rows(), a.cols()));
    for ((r, c), v) in out.indexed_iter_mut() {
        *v = a.at(r, c) - b.at(r, c);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::arr2;

    #[test]
    fn ones_added_prepends_constant_column() {
        let m = arr2(&[[2.0, 3.0], [4.0, 5.0]]);
        let v = OnesAdded(&m);
        assert_eq!((v.rows(), v.cols()), (2, 3));
        assert_eq!(v.at(0, 0), 1.0);
        assert_eq!(v.at(1, 0), 1.0);
        assert_eq!(v.at(0, 1), 2.0);
        assert_eq!(v.at(1, 2), 5.0);
    }

    #[test]
    fn applied_maps_on_read() {
        let m = arr2(&[[1.0, -2.0]]);
        let v = Applied::new(&m, |x| x * x);
        assert_eq!(v.at(0, 0), 1.0);
        assert_eq!(v.at(0, 1), 4.0);
        // The underlying matrix is untouched.
        assert_eq!(m[[0, 1]], -2.0);
    }

    #[test]
    fn bias_trimmed_transpose_drops_bias_row() {
        // Weights (1 + 2 inputs, 3 outputs); row 0 is the bias row.
        let theta = arr2(&[[9.0, 9.0, 9.0], [1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        let v = BiasTrimmedT(&theta);
        assert_eq!((v.rows(), v.cols()), (3, 2));
        // v[i][j] = theta[1 + j][i]
        assert_eq!(v.at(0, 0), 1.0);
        assert_eq!(v.at(0, 1), 4.0);
        assert_eq!(v.at(2, 0), 3.0);
        assert_eq!(v.at(2, 1), 6.0);
    }

    #[test]
    fn mat_mul_matches_ndarray_dot() {
        let a = arr2(&[[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let b = arr2(&[[7.0, 8.0], [9.0, 10.0]]);
        let mut out = Array2::zeros((3, 2));
        mat_mul_into(&mut out, &a, &b);
        let expected = a.dot(&b);
        assert_eq!(out, expected);
    }

    #[test]
    fn mat_mul_through_views() {
        let x = arr2(&[[2.0], [3.0]]);
        // theta: bias row [10], weight row [1]
        let theta = arr2(&[[10.0], [1.0]]);
        let mut out = Array2::zeros((2, 1));
        mat_mul_into(&mut out, &OnesAdded(&x), &theta);
        assert_eq!(out, arr2(&[[12.0], [13.0]]));
    }

    #[test]
    fn mul_elem_and_sub() {
        let mut buf = arr2(&[[2.0, 3.0]]);
        let m = arr2(&[[4.0, 5.0]]);
        mul_elem_assign(&mut buf, &m);
        assert_eq!(buf, arr2(&[[8.0, 15.0]]));

        let a = arr2(&[[1.0, 1.0]]);
        let mut out = Array2::zeros((1, 2));
        sub_into(&mut out, &buf, &a);
        assert_eq!(out, arr2(&[[7.0, 14.0]]));
    }
}
