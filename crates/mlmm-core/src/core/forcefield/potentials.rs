use crate::core::units::COULOMB_CONSTANT;
use nalgebra::{Point3, Vector3};

const SMALL: f64 = 1e-12;

/// Applies the minimum-image convention for a rectangular box.
#[inline]
pub fn minimum_image(mut delta: Vector3<f64>, periodic_box: Option<&Vector3<f64>>) -> Vector3<f64> {
    if let Some(edges) = periodic_box {
        for axis in 0..3 {
            let length = edges[axis];
            if length > 0.0 {
                delta[axis] -= length * (delta[axis] / length).round();
            }
        }
    }
    delta
}

/// Vector pointing from `from` to `to`, wrapped into the minimum image.
#[inline]
pub fn displacement(
    from: &Point3<f64>,
    to: &Point3<f64>,
    periodic_box: Option<&Vector3<f64>>,
) -> Vector3<f64> {
    minimum_image(to - from, periodic_box)
}

/// Harmonic well `k (x - x0)²`. Returns the energy and `dE/dx`.
#[inline]
pub fn harmonic(x: f64, k: f64, x0: f64) -> (f64, f64) {
    let dx = x - x0;
    (k * dx * dx, 2.0 * k * dx)
}

/// Lennard-Jones in A/B form, `A/r¹² - B/r⁶`. Returns the energy and `dE/dr`.
#[inline]
pub fn lennard_jones(r: f64, a: f64, b: f64) -> (f64, f64) {
    let inv_r = 1.0 / r.max(SMALL);
    let inv_r6 = inv_r.powi(6);
    let inv_r12 = inv_r6 * inv_r6;
    let energy = a * inv_r12 - b * inv_r6;
    let derivative = (-12.0 * a * inv_r12 + 6.0 * b * inv_r6) * inv_r;
    (energy, derivative)
}

/// Plain Coulomb interaction between two charges in e. Returns the energy and `dE/dr`.
#[inline]
pub fn coulomb(r: f64, q1: f64, q2: f64) -> (f64, f64) {
    let r = r.max(SMALL);
    let energy = COULOMB_CONSTANT * q1 * q2 / r;
    (energy, -energy / r)
}

/// Periodic torsion `k (1 + cos(nφ - phase))`. Returns the energy and `dE/dφ`.
#[inline]
pub fn periodic_torsion(phi: f64, k: f64, periodicity: f64, phase: f64) -> (f64, f64) {
    let arg = periodicity * phi - phase;
    (k * (1.0 + arg.cos()), -k * periodicity * arg.sin())
}

/// Pairwise radial force: given `d = x_j - x_i`, `r = |d|` and `dE/dr`, returns the force on `i`.
///
/// The force on `j` is the negation.
#[inline]
pub fn radial_force(d: &Vector3<f64>, r: f64, de_dr: f64) -> Vector3<f64> {
    if r < SMALL {
        return Vector3::zeros();
    }
    d * (de_dr / r)
}

/// Evaluates a harmonic angle term. Returns the energy and the forces on atoms (i, j, k).
pub fn harmonic_angle(
    positions: [&Point3<f64>; 3],
    k: f64,
    theta0: f64,
    periodic_box: Option<&Vector3<f64>>,
) -> (f64, [Vector3<f64>; 3]) {
    let a = displacement(positions[1], positions[0], periodic_box);
    let b = displacement(positions[1], positions[2], periodic_box);
    let ra = a.norm();
    let rb = b.norm();
    if ra < SMALL || rb < SMALL {
        return (0.0, [Vector3::zeros(); 3]);
    }
    let a_hat = a / ra;
    let b_hat = b / rb;
    let cos_theta = a_hat.dot(&b_hat).clamp(-1.0, 1.0);
    let theta = cos_theta.acos();
    let sin_theta = (1.0 - cos_theta * cos_theta).sqrt().max(1e-8);

    let (energy, de_dtheta) = harmonic(theta, k, theta0);
    let f_i = (b_hat - a_hat * cos_theta) * (de_dtheta / (ra * sin_theta));
    let f_k = (a_hat - b_hat * cos_theta) * (de_dtheta / (rb * sin_theta));
    let f_j = -(f_i + f_k);
    (energy, [f_i, f_j, f_k])
}

/// Signed dihedral angle i-j-k-l in radians, in (-π, π].
pub fn dihedral_angle(
    positions: [&Point3<f64>; 4],
    periodic_box: Option<&Vector3<f64>>,
) -> f64 {
    let r_ij = displacement(positions[1], positions[0], periodic_box);
    let r_kj = displacement(positions[1], positions[2], periodic_box);
    let r_kl = displacement(positions[3], positions[2], periodic_box);
    let m = r_ij.cross(&r_kj);
    let n = r_kj.cross(&r_kl);
    signed_angle(&m, &n, &r_ij)
}

fn signed_angle(m: &Vector3<f64>, n: &Vector3<f64>, r_ij: &Vector3<f64>) -> f64 {
    let cos_phi = (m.dot(n) / (m.norm() * n.norm()).max(SMALL)).clamp(-1.0, 1.0);
    let phi = cos_phi.acos();
    if r_ij.dot(n) < 0.0 { -phi } else { phi }
}

/// Evaluates a periodic torsion. Returns the energy and the forces on atoms (i, j, k, l).
pub fn torsion(
    positions: [&Point3<f64>; 4],
    k: f64,
    periodicity: f64,
    phase: f64,
    periodic_box: Option<&Vector3<f64>>,
) -> (f64, [Vector3<f64>; 4]) {
    let r_ij = displacement(positions[1], positions[0], periodic_box);
    let r_kj = displacement(positions[1], positions[2], periodic_box);
    let r_kl = displacement(positions[3], positions[2], periodic_box);
    let m = r_ij.cross(&r_kj);
    let n = r_kj.cross(&r_kl);
    let m2 = m.norm_squared();
    let n2 = n.norm_squared();
    let rkj2 = r_kj.norm_squared();
    if m2 < SMALL || n2 < SMALL || rkj2 < SMALL {
        return (0.0, [Vector3::zeros(); 4]);
    }

    let phi = signed_angle(&m, &n, &r_ij);
    let (energy, de_dphi) = periodic_torsion(phi, k, periodicity, phase);

    let rkj = rkj2.sqrt();
    let f_i = m * (-de_dphi * rkj / m2);
    let f_l = n * (de_dphi * rkj / n2);
    let p = r_ij.dot(&r_kj) / rkj2;
    let q = r_kl.dot(&r_kj) / rkj2;
    let s = f_i * p - f_l * q;
    let f_j = f_i - s;
    let f_k = f_l + s;
    (energy, [f_i, -f_j, -f_k, f_l])
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-9;

    fn f64_approx_equal(a: f64, b: f64) -> bool {
        (a - b).abs() < TOLERANCE
    }

    #[test]
    fn harmonic_is_zero_at_minimum() {
        let (e, de) = harmonic(0.15, 1000.0, 0.15);
        assert!(f64_approx_equal(e, 0.0));
        assert!(f64_approx_equal(de, 0.0));
    }

    #[test]
    fn harmonic_has_no_half_prefactor() {
        let (e, de) = harmonic(2.0, 3.0, 1.0);
        assert!(f64_approx_equal(e, 3.0));
        assert!(f64_approx_equal(de, 6.0));
    }

    #[test]
    fn lennard_jones_derivative_vanishes_at_minimum() {
        let a = 4.0_f64;
        let b = 4.0_f64;
        let r_min = (2.0 * a / b).powf(1.0 / 6.0);
        let (e, de) = lennard_jones(r_min, a, b);
        assert!(de.abs() < 1e-9);
        assert!(f64_approx_equal(e, -b * b / (4.0 * a)));
    }

    #[test]
    fn coulomb_matches_constant_at_unit_distance() {
        let (e, de) = coulomb(1.0, 1.0, -1.0);
        assert!(f64_approx_equal(e, -COULOMB_CONSTANT));
        assert!(f64_approx_equal(de, COULOMB_CONSTANT));
    }

    #[test]
    fn minimum_image_wraps_long_displacements() {
        let edges = Vector3::new(2.0, 2.0, 2.0);
        let wrapped = minimum_image(Vector3::new(1.9, -1.2, 0.3), Some(&edges));
        assert!(f64_approx_equal(wrapped.x, -0.1));
        assert!(f64_approx_equal(wrapped.y, 0.8));
        assert!(f64_approx_equal(wrapped.z, 0.3));
    }

    #[test]
    fn minimum_image_without_box_is_identity() {
        let d = Vector3::new(5.0, -7.0, 9.0);
        assert_eq!(minimum_image(d, None), d);
    }

    #[test]
    fn dihedral_angle_of_trans_chain_is_pi() {
        let p = [
            Point3::new(1.0, 1.0, 0.0),
            Point3::new(1.0, 0.0, 0.0),
            Point3::new(2.0, 0.0, 0.0),
            Point3::new(2.0, -1.0, 0.0),
        ];
        let phi = dihedral_angle([&p[0], &p[1], &p[2], &p[3]], None);
        assert!((phi.abs() - std::f64::consts::PI).abs() < 1e-9);
    }

    fn numerical_gradient<F>(positions: &[Point3<f64>], atom: usize, energy: F) -> Vector3<f64>
    where
        F: Fn(&[Point3<f64>]) -> f64,
    {
        let h = 1e-6;
        let mut grad = Vector3::zeros();
        for axis in 0..3 {
            let mut plus = positions.to_vec();
            let mut minus = positions.to_vec();
            plus[atom][axis] += h;
            minus[atom][axis] -= h;
            grad[axis] = (energy(&plus) - energy(&minus)) / (2.0 * h);
        }
        grad
    }

    #[test]
    fn angle_forces_match_finite_differences() {
        let p = vec![
            Point3::new(0.12, 0.01, 0.0),
            Point3::new(0.0, 0.0, 0.02),
            Point3::new(-0.03, 0.14, 0.01),
        ];
        let energy = |x: &[Point3<f64>]| harmonic_angle([&x[0], &x[1], &x[2]], 250.0, 1.9, None).0;
        let (_, forces) = harmonic_angle([&p[0], &p[1], &p[2]], 250.0, 1.9, None);
        for atom in 0..3 {
            let expected = -numerical_gradient(&p, atom, energy);
            assert!((forces[atom] - expected).norm() < 1e-4);
        }
    }

    #[test]
    fn torsion_forces_match_finite_differences() {
        let p = vec![
            Point3::new(0.1, 0.12, 0.03),
            Point3::new(0.0, 0.0, 0.0),
            Point3::new(0.15, 0.0, 0.0),
            Point3::new(0.22, -0.1, 0.08),
        ];
        let energy = |x: &[Point3<f64>]| {
            torsion([&x[0], &x[1], &x[2], &x[3]], 2.5, 3.0, 0.4, None).0
        };
        let (_, forces) = torsion([&p[0], &p[1], &p[2], &p[3]], 2.5, 3.0, 0.4, None);
        for atom in 0..4 {
            let expected = -numerical_gradient(&p, atom, energy);
            assert!((forces[atom] - expected).norm() < 1e-4);
        }
        let net: Vector3<f64> = forces.iter().sum();
        assert!(net.norm() < 1e-9);
    }
}
