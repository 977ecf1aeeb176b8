//! Limited-memory inverse-Hessian state for box-bounded minimization.

/// Ring buffer of the last `m` curvature pairs `(s, y)` with `rho = 1 / s·y`,
/// stored flat in contiguous memory.
struct RingHistory {
    s_flat: Vec<f64>,
    y_flat: Vec<f64>,
    rho: Vec<f64>,
    n: usize,
    m: usize,
    head: usize,
    len: usize,
}

impl RingHistory {
    fn new(m: usize, n: usize) -> Self {
        let m = m.max(1);
        Self {
            s_flat: vec![0.0; m * n],
            y_flat: vec![0.0; m * n],
            rho: vec![0.0; m],
            n,
            m,
            head: 0,
            len: 0,
        }
    }

    /// Overwrites the oldest pair when full.
    fn push(&mut self, s: &[f64], y: &[f64], rho: f64) {
        let slot = if self.len < self.m {
            let slot = (self.head + self.len) % self.m;
            self.len += 1;
            slot
        } else {
            let slot = self.head;
            self.head = (self.head + 1) % self.m;
            slot
        };
        let off = slot * self.n;
        self.s_flat[off..off + self.n].copy_from_slice(s);
        self.y_flat[off..off + self.n].copy_from_slice(y);
        self.rho[slot] = rho;
    }

    fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }

    #[inline]
    fn slot(&self, i: usize) -> usize {
        (self.head + i) % self.m
    }

    /// `i = 0` is the oldest pair.
    #[inline]
    fn s(&self, i: usize) -> &[f64] {
        let off = self.slot(i) * self.n;
        &self.s_flat[off..off + self.n]
    }

    #[inline]
    fn y(&self, i: usize) -> &[f64] {
        let off = self.slot(i) * self.n;
        &self.y_flat[off..off + self.n]
    }

    #[inline]
    fn rho(&self, i: usize) -> f64 {
        self.rho[self.slot(i)]
    }
}

#[inline]
fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Quasi-Newton state: current point, gradient and curvature history.
pub(crate) struct LbfgsState {
    pub x: Vec<f64>,
    pub grad: Vec<f64>,
    pub fval: f64,
    history: RingHistory,
    bounds: Vec<(f64, f64)>,
}

impl LbfgsState {
    /// `x0` is clamped into `bounds`; `fval`/`grad` must be evaluated there.
    pub fn new(x: Vec<f64>, fval: f64, grad: Vec<f64>, bounds: Vec<(f64, f64)>, m: usize) -> Self {
        let n = x.len();
        Self { x, grad, fval, history: RingHistory::new(m, n), bounds }
    }

    pub fn clamp_to_bounds(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
        x.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
    }

    /// True if `x_i` sits on a bound and `-g_i` points outside.
    #[inline]
    fn is_pinned(&self, i: usize, g: f64) -> bool {
        const EPS: f64 = 1e-12;
        let (lo, hi) = self.bounds[i];
        let x = self.x[i];
        (x <= lo + EPS && g > 0.0) || (x >= hi - EPS && g < 0.0)
    }

    /// Gradient with pinned components zeroed.
    pub fn projected_gradient(&self) -> Vec<f64> {
        self.grad
            .iter()
            .enumerate()
            .map(|(i, &g)| if self.is_pinned(i, g) { 0.0 } else { g })
            .collect()
    }

    /// Infinity norm of the projected gradient.
    pub fn projected_gradient_norm(&self) -> f64 {
        self.projected_gradient().iter().fold(0.0_f64, |acc, g| acc.max(g.abs()))
    }

    /// Two-loop recursion on the projected gradient; falls back to steepest
    /// descent if the result is not a descent direction.
    pub fn direction(&self) -> Vec<f64> {
        let pg = self.projected_gradient();
        let k = self.history.len;
        if k == 0 {
            return pg.iter().map(|g| -g).collect();
        }

        let mut q = pg.clone();
        let mut alpha = vec![0.0; k];
        for i in (0..k).rev() {
            alpha[i] = self.history.rho(i) * dot(self.history.s(i), &q);
            for (qj, yj) in q.iter_mut().zip(self.history.y(i)) {
                *qj -= alpha[i] * yj;
            }
        }

        // H0 = gamma * I
        let (s_last, y_last) = (self.history.s(k - 1), self.history.y(k - 1));
        let yy = dot(y_last, y_last);
        let gamma = if yy > 1e-30 { dot(s_last, y_last) / yy } else { 1.0 };
        let mut r: Vec<f64> = q.iter().map(|qi| gamma * qi).collect();

        for (i, &a) in alpha.iter().enumerate() {
            let beta = self.history.rho(i) * dot(self.history.y(i), &r);
            for (rj, sj) in r.iter_mut().zip(self.history.s(i)) {
                *rj += (a - beta) * sj;
            }
        }

        let mut d: Vec<f64> = r.iter().map(|v| -v).collect();
        for (i, di) in d.iter_mut().enumerate() {
            if pg[i] == 0.0 && self.is_pinned(i, self.grad[i]) {
                *di = 0.0;
            }
        }
        if !(dot(&d, &self.grad) < 0.0) {
            return pg.iter().map(|g| -g).collect();
        }
        d
    }

    /// Clamped trial point `x + step * d`.
    pub fn trial(&self, d: &[f64], step: f64) -> Vec<f64> {
        let x: Vec<f64> = self.x.iter().zip(d).map(|(x, d)| x + step * d).collect();
        Self::clamp_to_bounds(&x, &self.bounds)
    }

    /// Move to an accepted point and record the curvature pair when `s·y > 0`.
    pub fn accept(&mut self, x: Vec<f64>, fval: f64, grad: Vec<f64>) {
        let s: Vec<f64> = x.iter().zip(&self.x).map(|(a, b)| a - b).collect();
        let y: Vec<f64> = grad.iter().zip(&self.grad).map(|(a, b)| a - b).collect();
        let sy = dot(&s, &y);
        if sy > 1e-10 {
            self.history.push(&s, &y, 1.0 / sy);
        }
        self.x = x;
        self.fval = fval;
        self.grad = grad;
    }

    /// Drop the curvature history (after a failed line search).
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    pub fn history_len(&self) -> usize {
        self.history.len
    }
}
