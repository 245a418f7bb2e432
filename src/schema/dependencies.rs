use super::tables::{get_entity, ALL_ENTITIES};
use super::types::{EntityKind, EntitySchema};
use std::collections::{HashMap, HashSet};

/// Resolves entity dependencies so parents are always mirrored first
pub struct DependencyResolver {
    /// Map of entity -> entities it depends on
    deps: HashMap<EntityKind, HashSet<EntityKind>>,
}

impl DependencyResolver {
    pub fn new() -> Self {
        let deps = ALL_ENTITIES
            .iter()
            .map(|entity| (entity.kind, entity.dependencies()))
            .collect();

        Self { deps }
    }

    /// Return all entities in dependency order
    pub fn all_entities_ordered(&self) -> Result<Vec<&'static EntitySchema>, String> {
        let all: Vec<EntityKind> = ALL_ENTITIES.iter().map(|e| e.kind).collect();
        self.topological_sort(&all)
    }

    /// Entities that follow `last` in the canonical order
    pub fn entities_after(&self, last: EntityKind) -> Result<Vec<&'static EntitySchema>, String> {
        let ordered = self.all_entities_ordered()?;
        let pos = ordered
            .iter()
            .position(|e| e.kind == last)
            .ok_or_else(|| format!("Unknown entity type: {}", last))?;
        Ok(ordered[pos + 1..].to_vec())
    }

    /// Check that every entity appears after all of its parents
    pub fn validate_order(&self, order: &[EntityKind]) -> Result<(), String> {
        let mut seen: HashSet<EntityKind> = HashSet::new();

        for kind in order {
            if let Some(parents) = self.deps.get(kind) {
                let mut missing: Vec<_> = parents.difference(&seen).collect();
                if !missing.is_empty() {
                    missing.sort();
                    return Err(format!(
                        "{} is ordered before its parent(s) {:?}",
                        kind, missing
                    ));
                }
            }
            seen.insert(*kind);
        }

        Ok(())
    }

    /// Topological sort of entities by dependencies.
    ///
    /// Visits in the given order, so a list that is already valid comes back unchanged.
    fn topological_sort(
        &self,
        included: &[EntityKind],
    ) -> Result<Vec<&'static EntitySchema>, String> {
        let included_set: HashSet<EntityKind> = included.iter().copied().collect();
        let mut result = Vec::new();
        let mut visited: HashSet<EntityKind> = HashSet::new();
        let mut temp_visited: HashSet<EntityKind> = HashSet::new();

        for kind in included {
            if !visited.contains(kind) {
                self.visit(
                    *kind,
                    &included_set,
                    &mut visited,
                    &mut temp_visited,
                    &mut result,
                )?;
            }
        }

        Ok(result)
    }

    fn visit(
        &self,
        kind: EntityKind,
        included: &HashSet<EntityKind>,
        visited: &mut HashSet<EntityKind>,
        temp_visited: &mut HashSet<EntityKind>,
        result: &mut Vec<&'static EntitySchema>,
    ) -> Result<(), String> {
        if temp_visited.contains(&kind) {
            return Err(format!("Circular dependency detected at: {}", kind));
        }
        if visited.contains(&kind) {
            return Ok(());
        }

        temp_visited.insert(kind);

        if let Some(deps) = self.deps.get(&kind) {
            let mut deps: Vec<_> = deps.iter().copied().collect();
            deps.sort();
            for dep in deps {
                if included.contains(&dep) {
                    self.visit(dep, included, visited, temp_visited, result)?;
                }
            }
        }

        temp_visited.remove(&kind);
        visited.insert(kind);
        result.push(get_entity(kind));

        Ok(())
    }
}

impl Default for DependencyResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_order_is_topological() {
        let resolver = DependencyResolver::new();
        let ordered: Vec<_> = resolver
            .all_entities_ordered()
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();

        assert_eq!(
            ordered,
            vec![
                EntityKind::University,
                EntityKind::Institute,
                EntityKind::Department,
                EntityKind::Specialty,
                EntityKind::Group,
                EntityKind::Course,
                EntityKind::Lecture,
                EntityKind::Material,
                EntityKind::Schedule,
                EntityKind::Student,
                EntityKind::Attendance,
            ]
        );
        assert!(resolver.validate_order(&ordered).is_ok());
    }

    #[test]
    fn test_child_before_parent_is_rejected() {
        let resolver = DependencyResolver::new();
        let err = resolver
            .validate_order(&[EntityKind::Institute, EntityKind::University])
            .unwrap_err();
        assert!(err.contains("Institute is ordered before"));
    }

    #[test]
    fn test_course_needs_both_parents() {
        let resolver = DependencyResolver::new();
        let order = [
            EntityKind::University,
            EntityKind::Institute,
            EntityKind::Department,
            EntityKind::Course,
        ];
        assert!(resolver.validate_order(&order).is_err());
    }

    #[test]
    fn test_entities_after() {
        let resolver = DependencyResolver::new();
        let rest: Vec<_> = resolver
            .entities_after(EntityKind::Schedule)
            .unwrap()
            .iter()
            .map(|e| e.kind)
            .collect();
        assert_eq!(rest, vec![EntityKind::Student, EntityKind::Attendance]);

        assert!(resolver
            .entities_after(EntityKind::Attendance)
            .unwrap()
            .is_empty());
    }
}
