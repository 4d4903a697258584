use mec_geom::{center_of_mass, obliquity_degrees, Affine, Volume};

fn rotated_z(degrees: f64, scale: f64) -> Affine {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let mut affine = Affine::identity();
    affine.0[0][0] = scale * cos;
    affine.0[0][1] = -scale * sin;
    affine.0[1][0] = scale * sin;
    affine.0[1][1] = scale * cos;
    affine.0[2][2] = scale;
    affine
}

#[test]
fn identity_transform_is_plumb() {
    assert!(obliquity_degrees(&Affine::identity()).abs() < 1e-9);
}

#[test]
fn axis_aligned_scaling_stays_plumb() {
    let affine = Affine::scaled([2.5, 2.5, 3.0], [-120.0, -110.0, -60.0]);
    assert!(obliquity_degrees(&affine).abs() < 1e-9);
}

#[test]
fn thirty_degree_rotation_measures_thirty_degrees() {
    let angle = obliquity_degrees(&rotated_z(30.0, 1.0));
    assert!((angle - 30.0).abs() < 1e-6, "got {angle}");
    // Voxel scaling does not change the angle.
    let scaled = obliquity_degrees(&rotated_z(30.0, 3.0));
    assert!((scaled - 30.0).abs() < 1e-6, "got {scaled}");
}

#[test]
fn small_rotations_are_nonzero() {
    let angle = obliquity_degrees(&rotated_z(4.0, 3.0));
    assert!(angle > 3.9 && angle < 4.1, "got {angle}");
}

#[test]
fn uniform_volume_centers_on_the_grid() {
    // A symmetric, uniformly-weighted volume must land on the geometric
    // center of the grid: the same point the zero-volume fallback picks.
    let affine = Affine::scaled([3.0, 3.0, 3.0], [-90.0, -126.0, -72.0]);
    let uniform = center_of_mass(&Volume::constant(1.0, [7, 9, 11]), &affine);
    let fallback = center_of_mass(&Volume::constant(0.0, [7, 9, 11]), &affine);
    for axis in 0..3 {
        assert!(
            (uniform[axis] - fallback[axis]).abs() < 1e-9,
            "axis {axis}: {uniform:?} vs {fallback:?}"
        );
    }
}

#[test]
fn point_mass_lands_on_its_voxel() {
    let shape = [5, 5, 5];
    let mut data = vec![0.0; 125];
    data[2 + 5 * (3 + 5 * 4)] = 7.5; // voxel (2, 3, 4)
    let volume = Volume::new(data, shape).expect("volume");
    let affine = Affine::scaled([2.0, 2.0, 2.0], [4.0, 6.0, 8.0]);
    let cm = center_of_mass(&volume, &affine);
    // The first two physical axes follow the flipped-row convention.
    assert!((cm[0] - (-4.0 - 2.0 * 2.0)).abs() < 1e-9, "x was {}", cm[0]);
    assert!((cm[1] - (-6.0 - 3.0 * 2.0)).abs() < 1e-9, "y was {}", cm[1]);
    assert!((cm[2] - (8.0 + 4.0 * 2.0)).abs() < 1e-9, "z was {}", cm[2]);
}
