//! Mesh trait compliance test helpers.
//!
//! Reused by every backend's test module.

use crate::mesh::{ElementGeometry, Mesh};
use indexmap::IndexSet;
use mosaic_core::{BoundaryId, ElementId, NodeId};

const TOL: f64 = 1e-12;

/// Assert that shape functions sum to one at every interior and side point.
pub fn assert_partition_of_unity(mesh: &dyn Mesh) {
    let mut geom = ElementGeometry::default();
    for e in 0..mesh.element_count() as u32 {
        mesh.reinit_element(ElementId(e), &mut geom).unwrap();
        check_unity(&geom, "interior");
    }
    for side in mesh.boundary_sides() {
        mesh.reinit_side(side.element, side.side, &mut geom).unwrap();
        check_unity(&geom, "side");
    }
}

fn check_unity(geom: &ElementGeometry, what: &str) {
    for qp in 0..geom.n_qp() {
        let sum: f64 = (0..geom.n_shape()).map(|s| geom.phi[s][qp]).sum();
        assert!(
            (sum - 1.0).abs() < TOL,
            "{what} element {} qp {qp}: sum phi = {sum}",
            geom.element
        );
        for d in 0..3 {
            let g: f64 = (0..geom.n_shape()).map(|s| geom.grad_phi[s][qp][d]).sum();
            assert!(
                g.abs() < 1e-9,
                "{what} element {} qp {qp}: sum grad phi[{d}] = {g}",
                geom.element
            );
        }
    }
}

/// Assert that interior weights sum to the domain volume.
pub fn assert_weights_sum_to_volume(mesh: &dyn Mesh, volume: f64) {
    let mut geom = ElementGeometry::default();
    let mut total = 0.0;
    for e in 0..mesh.element_count() as u32 {
        mesh.reinit_element(ElementId(e), &mut geom).unwrap();
        for &w in &geom.jxw {
            assert!(w > 0.0, "element {e}: non-positive JxW {w}");
        }
        total += geom.jxw.iter().sum::<f64>();
    }
    assert!(
        (total - volume).abs() < 1e-10 * volume.max(1.0),
        "sum JxW = {total}, expected {volume}"
    );
}

/// Assert that every element's nodes exist and are distinct.
pub fn assert_element_nodes_valid(mesh: &dyn Mesh) {
    for e in 0..mesh.element_count() as u32 {
        let info = mesh.element(ElementId(e)).unwrap();
        let unique: IndexSet<NodeId> = info.nodes.iter().copied().collect();
        assert_eq!(unique.len(), info.nodes.len(), "element {e} repeats a node");
        for n in &info.nodes {
            assert!(n.index() < mesh.node_count(), "element {e}: node {n} out of range");
        }
    }
}

/// Assert that every boundary node list is non-empty and strictly ascending.
pub fn assert_boundary_nodes_sorted(mesh: &dyn Mesh) {
    for (_, b) in mesh.boundaries().iter() {
        let nodes = mesh.boundary_nodes(BoundaryId(b)).unwrap();
        assert!(!nodes.is_empty(), "boundary {b} has no nodes");
        assert!(
            nodes.windows(2).all(|w| w[0] < w[1]),
            "boundary {b} nodes not strictly ascending"
        );
    }
}

/// Assert that two reinit calls produce identical data.
pub fn assert_reinit_deterministic(mesh: &dyn Mesh) {
    let mut a = ElementGeometry::default();
    let mut b = ElementGeometry::default();
    for e in 0..mesh.element_count() as u32 {
        mesh.reinit_element(ElementId(e), &mut a).unwrap();
        mesh.reinit_element(ElementId(e), &mut b).unwrap();
        assert_eq!(a.jxw, b.jxw);
        assert_eq!(a.phi, b.phi);
        assert_eq!(a.q_points, b.q_points);
    }
}

/// Run every compliance check on a mesh whose domain has `volume`.
pub fn run_full_compliance(mesh: &dyn Mesh, volume: f64) {
    assert_partition_of_unity(mesh);
    assert_weights_sum_to_volume(mesh, volume);
    assert_element_nodes_valid(mesh);
    assert_boundary_nodes_sorted(mesh);
    assert_reinit_deterministic(mesh);
}
