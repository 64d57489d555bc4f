use anyhow::{anyhow, Result};
use nalgebra::Vector3;

/// Extended Euclid: returns (g, p, q) with p*a + q*b = g = gcd(a, b),
/// g normalised positive.
fn extended_gcd(a: i32, b: i32) -> (i32, i32, i32) {
    if b == 0 {
        if a < 0 {
            (-a, -1, 0)
        } else {
            (a, 1, 0)
        }
    } else {
        let (g, p, q) = extended_gcd(b, a % b);
        (g, q, p - (a / b) * q)
    }
}

/// Two integer lattice vectors (u, v) spanning the (h k l) plane
/// lattice completely: for gcd-reduced indices every integer vector in
/// the plane is an integer combination of the pair, and u x v = +-(h k l),
/// so the in-plane cell has the smallest possible area.
///
/// Construction: u kills the (k, l) part outright; the Bezout
/// coefficients of gcd(k, l) give a second vector with the minimal
/// first component.
pub fn in_plane_basis(hkl: [i32; 3]) -> Result<(Vector3<i32>, Vector3<i32>)> {
    let [h, k, l] = hkl;
    if h == 0 && k == 0 && l == 0 {
        return Err(anyhow!("Miller index cannot be (0,0,0)"));
    }

    if k == 0 && l == 0 {
        return Ok((Vector3::new(0, 1, 0), Vector3::new(0, 0, 1)));
    }

    let (g, p, q) = extended_gcd(k, l);
    let u = Vector3::new(0, l / g, -(k / g));
    let v = Vector3::new(g, -p * h, -q * h);
    Ok((u, v))
}
