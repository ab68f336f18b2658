// surge-core/src/kernel.rs
// Numeric kernel used to burn CPU cycles and memory bandwidth

use std::hint::black_box;
use std::time::{Duration, Instant};

/// CPU-bound leaf computation. Only the elapsed time is observed; the
/// numeric output is thrown away.
pub trait NumericKernel: Send + Sync {
    /// Run `iterations` rounds of elementwise transforms over a fresh
    /// `size x size` buffer. Allocation is not part of the timing.
    fn transform(&self, size: usize, iterations: usize) -> Duration;

    /// Allocate one `size x size` buffer and time `copies` full clones of it.
    fn clone_buffers(&self, size: usize, copies: usize) -> Duration;
}

/// Dense row-major square matrix of f32
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    size: usize,
    data: Vec<f32>,
}

impl Matrix {
    pub fn zeros(size: usize) -> Self {
        Self {
            size,
            data: vec![0.0; size * size],
        }
    }

    /// Uniform values in [0, 1)
    pub fn random(size: usize) -> Self {
        let mut rng = fastrand::Rng::new();
        let data = (0..size * size).map(|_| rng.f32()).collect();
        Self { size, data }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// cos -> sqrt(abs) -> log10(abs) -> sin, applied to every element
    pub fn apply_transforms(&mut self) {
        for x in self.data.iter_mut() {
            let v = x.cos();
            let v = v.abs().sqrt();
            let v = v.abs().log10();
            *x = v.sin();
        }
    }

    /// `out = self * self`
    pub fn square_into(&self, out: &mut Matrix) {
        let n = self.size;
        debug_assert_eq!(out.size, n);
        out.data.iter_mut().for_each(|v| *v = 0.0);

        // i-k-j order keeps the inner loop on contiguous rows
        for i in 0..n {
            let out_row = &mut out.data[i * n..(i + 1) * n];
            for k in 0..n {
                let a_ik = self.data[i * n + k];
                let b_row = &self.data[k * n..(k + 1) * n];
                for (o, b) in out_row.iter_mut().zip(b_row) {
                    *o += a_ik * b;
                }
            }
        }
    }
}

/// Production kernel over in-memory f32 matrices
#[derive(Debug, Clone)]
pub struct TensorKernel {
    multiply: bool,
}

impl TensorKernel {
    pub fn new(multiply: bool) -> Self {
        Self { multiply }
    }

    pub fn multiplies(&self) -> bool {
        self.multiply
    }
}

impl Default for TensorKernel {
    fn default() -> Self {
        Self::new(true)
    }
}

impl NumericKernel for TensorKernel {
    fn transform(&self, size: usize, iterations: usize) -> Duration {
        let mut buffer = Matrix::random(size);
        let mut product = if self.multiply {
            Some(Matrix::zeros(size))
        } else {
            None
        };

        let start = Instant::now();
        for _ in 0..iterations {
            buffer.apply_transforms();
            if let Some(out) = product.as_mut() {
                buffer.square_into(out);
            }
        }
        let elapsed = start.elapsed();

        black_box(&buffer);
        black_box(&product);
        elapsed
    }

    fn clone_buffers(&self, size: usize, copies: usize) -> Duration {
        let source = Matrix::random(size);

        let start = Instant::now();
        for _ in 0..copies {
            let copy = source.clone();
            black_box(&copy);
        }
        start.elapsed()
    }
}
