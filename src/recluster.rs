//! Recomputes cluster membership after cells were added, removed or
//! connected across clusters.
//!
//! Cells are flattened into world space with their point velocities, split
//! into connected components, and every component becomes a rigid cluster
//! again whose linear and angular momentum match the cells it was built from.

use std::collections::{HashSet, VecDeque};

use alife_common::{periodic_displacement, wrap_position, Vec2, NEAR_ZERO};

use crate::entities::{Cell, Cluster, Token};
use crate::error::KernelError;

/// A cell lifted out of its cluster, with connections as indices into the
/// flat list.
#[derive(Debug, Clone)]
pub struct FlatCell {
    pub cell: Cell,
    pub pos: Vec2,
    pub vel: Vec2,
    pub connections: Vec<usize>,
    pub tokens: Vec<Token>,
    pub origin: u64,
    pub origin_angle: f32,
}

/// Flattens whole clusters. Connections keep pointing at the same cells.
pub fn flatten(clusters: Vec<Cluster>, world_size: Vec2) -> Vec<FlatCell> {
    let mut flat = Vec::with_capacity(clusters.iter().map(|c| c.cells.len()).sum());
    for cluster in clusters {
        let base = flat.len();
        let mut tokens_by_cell: Vec<Vec<Token>> = vec![Vec::new(); cluster.cells.len()];
        for token in cluster.tokens.iter() {
            if let Some(slot) = tokens_by_cell.get_mut(token.cell as usize) {
                slot.push(token.clone());
            }
        }
        for (i, (cell, tokens)) in cluster.cells.iter().zip(tokens_by_cell).enumerate() {
            let connections = cell.connections.iter().map(|&c| base + c as usize).collect();
            flat.push(FlatCell {
                cell: Cell { connections: Vec::new(), ..cell.clone() },
                pos: cluster.cell_world_pos(i, world_size),
                vel: cluster.cell_velocity(i),
                connections,
                tokens,
                origin: cluster.id,
                origin_angle: cluster.angle,
            });
        }
    }
    flat
}

/// Splits flat cells into connected components and builds one cluster per
/// component. Components are discovered in flat order and keep their cells
/// in flat order. A component reuses the id of the cluster its first cell
/// came from unless an earlier component already took it.
pub fn build_clusters(flat: Vec<FlatCell>, world_size: Vec2, next_id: &mut u64) -> Vec<Cluster> {
    let n = flat.len();
    let mut component_of = vec![usize::MAX; n];
    let mut unwrapped = vec![Vec2::zero(); n];
    let mut components: Vec<Vec<usize>> = Vec::new();

    for start in 0..n {
        if component_of[start] != usize::MAX {
            continue;
        }
        let id = components.len();
        let mut members = Vec::new();
        let mut queue = VecDeque::from([start]);
        component_of[start] = id;
        unwrapped[start] = flat[start].pos;
        while let Some(current) = queue.pop_front() {
            members.push(current);
            for &next in &flat[current].connections {
                if next < n && component_of[next] == usize::MAX {
                    component_of[next] = id;
                    unwrapped[next] =
                        unwrapped[current] + periodic_displacement(flat[current].pos, flat[next].pos, world_size);
                    queue.push_back(next);
                }
            }
        }
        members.sort_unstable();
        components.push(members);
    }

    let mut slots: Vec<Option<FlatCell>> = flat.into_iter().map(Some).collect();
    let mut claimed: HashSet<u64> = HashSet::new();
    let mut clusters = Vec::with_capacity(components.len());

    for members in components {
        let count = members.len() as f32;
        let center = members.iter().fold(Vec2::zero(), |acc, &i| acc + unwrapped[i]) / count;
        let cells: Vec<FlatCell> = members.iter().filter_map(|&i| slots[i].take()).collect();
        let vel = cells.iter().fold(Vec2::zero(), |acc, c| acc + c.vel) / count;

        let mut angular_momentum = 0.0;
        let mut angular_mass = 0.0;
        for (&i, c) in members.iter().zip(&cells) {
            let r = unwrapped[i] - center;
            angular_momentum += r.cross(c.vel - vel);
            angular_mass += r.length_squared();
        }
        let angular_vel = if angular_mass > NEAR_ZERO { (angular_momentum / angular_mass).to_degrees() } else { 0.0 };

        let first_origin = cells[0].origin;
        let single_origin = cells.iter().all(|c| c.origin == first_origin);
        let angle = if single_origin { cells[0].origin_angle } else { 0.0 };

        let id = if claimed.insert(first_origin) {
            first_origin
        } else {
            let id = *next_id;
            *next_id += 1;
            claimed.insert(id);
            id
        };

        let local_of = |global: usize| members.binary_search(&global).ok().map(|l| l as u32);
        let mut tokens = Vec::new();
        let mut new_cells = Vec::with_capacity(cells.len());
        for (local, (&i, flat_cell)) in members.iter().zip(cells).enumerate() {
            let FlatCell { mut cell, connections, tokens: cell_tokens, .. } = flat_cell;
            cell.rel_pos = (unwrapped[i] - center).rotate(-angle);
            cell.connections = connections.into_iter().filter_map(local_of).collect();
            tokens.extend(cell_tokens.into_iter().map(|t| Token { cell: local as u32, ..t }));
            new_cells.push(cell);
        }

        clusters.push(Cluster {
            id,
            pos: wrap_position(center, world_size),
            vel,
            angle,
            angular_vel,
            cells: new_cells,
            tokens,
        });
    }
    clusters
}

/// Checks that connections are symmetric, in range, free of self and
/// duplicate links, within each cell's limit, and that every cell is
/// reachable from the first one.
pub fn verify_connectivity(cluster: &Cluster) -> Result<(), KernelError> {
    let n = cluster.cells.len();
    for (i, cell) in cluster.cells.iter().enumerate() {
        let invalid = |reason: &'static str| KernelError::InvalidConnection { cluster_id: cluster.id, cell_id: cell.id, reason };
        if cell.connections.len() > cell.max_connections as usize {
            return Err(invalid("more connections than allowed"));
        }
        for (k, &other) in cell.connections.iter().enumerate() {
            if other as usize >= n {
                return Err(invalid("connection out of range"));
            }
            if other as usize == i {
                return Err(invalid("self-connection"));
            }
            if cell.connections[..k].contains(&other) {
                return Err(invalid("duplicate connection"));
            }
            if !cluster.cells[other as usize].is_connected_to(i as u32) {
                return Err(invalid("asymmetric connection"));
            }
        }
    }

    if n == 0 {
        return Ok(());
    }
    let mut visited = vec![false; n];
    let mut queue = VecDeque::from([0usize]);
    visited[0] = true;
    let mut reachable = 0;
    while let Some(current) = queue.pop_front() {
        reachable += 1;
        for &next in &cluster.cells[current].connections {
            if !visited[next as usize] {
                visited[next as usize] = true;
                queue.push_back(next as usize);
            }
        }
    }
    if reachable != n {
        return Err(KernelError::DisconnectedCluster { cluster_id: cluster.id, reachable, total: n });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::CellFunction;
    use crate::physics::kinetic_energy;

    const WORLD: Vec2 = Vec2 { x: 100.0, y: 100.0 };

    fn cell(id: u64, x: f32, y: f32, connections: Vec<u32>) -> Cell {
        Cell {
            id,
            rel_pos: Vec2::new(x, y),
            energy: 100.0,
            max_connections: 4,
            connections,
            token_branch_number: 0,
            color: 0,
            function: CellFunction::None,
        }
    }

    fn line(id: u64, pos: Vec2) -> Cluster {
        Cluster {
            id,
            pos,
            vel: Vec2::new(0.1, 0.0),
            angle: 30.0,
            angular_vel: 2.0,
            cells: vec![cell(10, -1.0, 0.0, vec![1]), cell(11, 0.0, 0.0, vec![0, 2]), cell(12, 1.0, 0.0, vec![1])],
            tokens: vec![Token { energy: 5.0, memory: vec![0; 8], cell: 2 }],
        }
    }

    #[test]
    fn connected_cluster_keeps_its_motion() {
        let cluster = line(1, Vec2::new(50.0, 50.0));
        let mut next_id = 100;
        let rebuilt = build_clusters(flatten(vec![cluster.clone()], WORLD), WORLD, &mut next_id);

        assert_eq!(rebuilt.len(), 1);
        let c = &rebuilt[0];
        assert_eq!(c.id, 1);
        assert_eq!(c.angle, 30.0);
        assert!(c.pos.distance(cluster.pos) < 1e-4);
        assert!(c.vel.distance(cluster.vel) < 1e-5);
        assert!((c.angular_vel - cluster.angular_vel).abs() < 1e-3);
        for (a, b) in c.cells.iter().zip(&cluster.cells) {
            assert!(a.rel_pos.distance(b.rel_pos) < 1e-4);
            assert_eq!(a.connections, b.connections);
        }
        assert_eq!(c.tokens[0].cell, 2);
        assert_eq!(next_id, 100);
    }

    #[test]
    fn broken_link_splits_and_conserves_momentum() {
        let mut cluster = line(1, Vec2::new(50.0, 50.0));
        cluster.cells[1].connections = vec![0];
        cluster.cells[2].connections.clear();
        let momentum_before = cluster.vel * cluster.mass();

        let mut next_id = 100;
        let parts = build_clusters(flatten(vec![cluster], WORLD), WORLD, &mut next_id);
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].id, 1);
        assert_eq!(parts[1].id, 100);
        assert_eq!(parts[0].cells.len(), 2);
        assert_eq!(parts[1].tokens.len(), 1);
        assert_eq!(parts[1].tokens[0].cell, 0);

        let momentum_after = parts.iter().fold(Vec2::zero(), |acc, p| acc + p.vel * p.mass());
        assert!(momentum_after.distance(momentum_before) < 1e-4);
        for part in &parts {
            verify_connectivity(part).expect("valid part");
        }
    }

    #[test]
    fn clusters_across_the_boundary_stay_compact() {
        let mut cluster = line(1, Vec2::new(99.6, 50.0));
        cluster.angle = 0.0;
        cluster.angular_vel = 0.0;
        let mut next_id = 100;
        let rebuilt = build_clusters(flatten(vec![cluster], WORLD), WORLD, &mut next_id);
        assert_eq!(rebuilt.len(), 1);
        let c = &rebuilt[0];
        assert!((c.pos.x - 99.6).abs() < 1e-3, "{:?}", c.pos);
        assert!((c.cells[0].rel_pos.x + 1.0).abs() < 1e-3);
        assert!((c.cells[2].rel_pos.x - 1.0).abs() < 1e-3);
    }

    #[test]
    fn merged_clusters_share_one_motion() {
        let a = Cluster {
            id: 1,
            pos: Vec2::new(10.0, 10.0),
            vel: Vec2::new(0.2, 0.0),
            angle: 0.0,
            angular_vel: 0.0,
            cells: vec![cell(10, 0.0, 0.0, Vec::new())],
            tokens: Vec::new(),
        };
        let b = Cluster {
            id: 2,
            pos: Vec2::new(11.0, 10.0),
            vel: Vec2::zero(),
            cells: vec![cell(11, 0.0, 0.0, Vec::new())],
            ..a.clone()
        };
        let mut flat = flatten(vec![a, b], WORLD);
        flat[0].connections.push(1);
        flat[1].connections.push(0);

        let mut next_id = 100;
        let merged = build_clusters(flat, WORLD, &mut next_id);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].id, 1);
        assert!(merged[0].vel.distance(Vec2::new(0.1, 0.0)) < 1e-6);
        assert!(merged[0].pos.distance(Vec2::new(10.5, 10.0)) < 1e-5);
        // rigid merge of a moving and a resting cell loses kinetic energy but
        // never gains it
        let e = kinetic_energy(merged[0].mass(), merged[0].vel, merged[0].angular_mass(), merged[0].angular_vel);
        assert!(e <= 0.5 * 0.04 + 1e-6);
    }

    #[test]
    fn verification_reports_broken_clusters() {
        let mut cluster = line(1, Vec2::new(50.0, 50.0));
        verify_connectivity(&cluster).expect("line is valid");

        cluster.cells[2].connections.clear();
        assert!(matches!(verify_connectivity(&cluster), Err(KernelError::InvalidConnection { cell_id: 11, .. })));

        cluster.cells[1].connections = vec![0];
        assert!(matches!(
            verify_connectivity(&cluster),
            Err(KernelError::DisconnectedCluster { reachable: 2, total: 3, .. })
        ));
    }
}
