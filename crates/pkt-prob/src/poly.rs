//! Polynomial helpers.
//!
//! Coefficients are always given in ascending order of power:
//! `p(x) = c[0] + c[1] x + c[2] x^2 + ...`.

use pkt_core::{Error, Result};
use std::f64::consts::PI;

/// Evaluate the polynomial with `coeffs` at `x` (Horner scheme).
///
/// An empty coefficient slice is the zero polynomial.
#[inline]
pub fn polyn(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, &c| acc * x + c)
}

/// Minimum of a polynomial of degree <= 2 on the interval `[0, 1]`.
///
/// Closed-form case analysis on the linear and quadratic coefficients: the
/// minimum sits either at an end point or at the vertex of the parabola.
/// Higher degrees fail with [`Error::UnsupportedDegree`].
pub fn min_polyn(coeffs: &[f64]) -> Result<f64> {
    match *coeffs {
        [] => Ok(0.0),
        [a0] => Ok(a0),
        [a0, a1] => Ok(if a1 >= 0.0 { a0 } else { a0 + a1 }),
        [a0, a1, a2] => {
            if (a2 == 0.0 && a1 >= 0.0) || (a2 > 0.0 && a1 >= 0.0) || (a2 < 0.0 && a1 > -a2) {
                return Ok(a0);
            }
            if a2 == 0.0 {
                return Ok(a0 + a1);
            }
            if (a2 > 0.0 && a1 <= -2.0 * a2) || (a2 < 0.0 && a1 <= -a2) {
                return Ok(a0 + a1 + a2);
            }
            // vertex inside (0, 1)
            Ok((4.0 * a0 * a2 - a1 * a1) / (4.0 * a2))
        }
        _ => Err(Error::UnsupportedDegree { degree: coeffs.len() - 1 }),
    }
}

/// Real roots of `c[0] + c[1] x + c[2] x^2 + c[3] x^3 = 0`, sorted ascending.
///
/// Returns either one root or three (possibly repeated) roots. The equation is
/// brought to monic form `x^3 + a x^2 + b x + c` and solved with the
/// trigonometric method when three real roots exist, Cardano otherwise.
pub fn solve_cubic(coefficients: [f64; 4]) -> Result<Vec<f64>> {
    let [c0, c1, c2, c3] = coefficients;
    if coefficients.iter().any(|c| !c.is_finite()) || c3 == 0.0 {
        return Err(Error::DegenerateCubic { coefficients });
    }
    let (a, b, c) = (c2 / c3, c1 / c3, c0 / c3);

    let q = a * a - 3.0 * b;
    let r = 2.0 * a * a * a - 9.0 * a * b + 27.0 * c;

    let big_q = q / 9.0;
    let big_r = r / 54.0;

    let q3 = big_q * big_q * big_q;
    let r2 = big_r * big_r;

    // scaled variants keep the discriminant test exact for integer inputs
    let cr2 = 729.0 * r * r;
    let cq3 = 2916.0 * q * q * q;

    let shift = a / 3.0;

    if big_r == 0.0 && big_q == 0.0 {
        return Ok(vec![-shift; 3]);
    }

    if cr2 == cq3 {
        // double root
        let sqrt_q = big_q.sqrt();
        return Ok(if big_r > 0.0 {
            vec![-2.0 * sqrt_q - shift, sqrt_q - shift, sqrt_q - shift]
        } else {
            vec![-sqrt_q - shift, -sqrt_q - shift, 2.0 * sqrt_q - shift]
        });
    }

    if r2 < q3 {
        let sgn_r = if big_r >= 0.0 { 1.0 } else { -1.0 };
        let ratio = (sgn_r * (r2 / q3).sqrt()).clamp(-1.0, 1.0);
        let theta = ratio.acos();
        let norm = -2.0 * big_q.sqrt();
        let mut roots = vec![
            norm * (theta / 3.0).cos() - shift,
            norm * ((theta + 2.0 * PI) / 3.0).cos() - shift,
            norm * ((theta - 2.0 * PI) / 3.0).cos() - shift,
        ];
        roots.sort_by(f64::total_cmp);
        return Ok(roots);
    }

    let sgn_r = if big_r >= 0.0 { 1.0 } else { -1.0 };
    let big_a = -sgn_r * (big_r.abs() + (r2 - q3).sqrt()).cbrt();
    let big_b = big_q / big_a;
    Ok(vec![big_a + big_b - shift])
}
