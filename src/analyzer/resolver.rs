//! Interface and abstract-class resolution, modelling dependency injection
//! without a running container.

use crate::annotations::{self, PRIMARY};
use crate::index::{MethodInfo, SymbolIndex, TypeInfo, TypeKind};
use anyhow::Result;
use std::collections::{HashSet, VecDeque};

pub struct InterfaceResolver<'a> {
    index: &'a dyn SymbolIndex,
}

impl<'a> InterfaceResolver<'a> {
    pub fn new(index: &'a dyn SymbolIndex) -> Self {
        Self { index }
    }

    /// Concrete inheritors of an interface or abstract class, sorted by
    /// qualified name. Concrete or unknown types have none.
    pub fn find_implementations(&self, type_name: &str, project_only: bool) -> Result<Vec<TypeInfo>> {
        let Some(info) = self.index.type_info(type_name)? else {
            return Ok(Vec::new());
        };
        if !info.kind.is_abstract() {
            return Ok(Vec::new());
        }
        let mut implementations: Vec<TypeInfo> = self
            .index
            .implementers_of(type_name)?
            .into_iter()
            .filter(|ty| ty.kind == TypeKind::Class)
            .filter(|ty| !project_only || ty.project_source)
            .collect();
        implementations.sort_by(|a, b| a.qualified_name.cmp(&b.qualified_name));
        implementations.dedup_by(|a, b| a.qualified_name == b.qualified_name);
        Ok(implementations)
    }

    /// Overrides of an abstract method in each implementation. Implementations
    /// without a matching declaration are skipped.
    pub fn find_method_implementations(&self, method: &MethodInfo) -> Result<Vec<MethodInfo>> {
        let owner_abstract = self
            .index
            .type_info(&method.owner)?
            .is_some_and(|t| t.kind == TypeKind::Interface);
        if !owner_abstract && !method.is_abstract {
            return Ok(Vec::new());
        }
        let mut overrides = Vec::new();
        for implementation in self.find_implementations(&method.owner, true)? {
            if let Some(found) = self.override_in(&implementation.qualified_name, method)? {
                overrides.push(found);
            }
        }
        Ok(overrides)
    }

    pub fn is_managed_component(&self, ty: &TypeInfo) -> bool {
        annotations::stereotypes_of(&ty.annotations)
            .into_iter()
            .any(|stereotype| stereotype.is_managed())
    }

    /// One implementation: it. Several: the `@Primary` one, else the first
    /// managed one, else `None` (ambiguous).
    pub fn get_primary_implementation(&self, type_name: &str) -> Result<Option<TypeInfo>> {
        let mut implementations = self.find_implementations(type_name, true)?;
        if implementations.len() <= 1 {
            return Ok(implementations.pop());
        }
        let primary = implementations
            .iter()
            .position(|ty| annotations::find(&ty.annotations, PRIMARY).is_some())
            .or_else(|| {
                implementations
                    .iter()
                    .position(|ty| self.is_managed_component(ty))
            });
        Ok(primary.map(|pos| implementations.swap_remove(pos)))
    }

    /// Injection candidates for a dependency of `type_name`: managed
    /// implementations, else every implementation. Concrete types inject
    /// themselves.
    pub fn resolve_injected_type(&self, type_name: &str) -> Result<Vec<TypeInfo>> {
        let Some(info) = self.index.type_info(type_name)? else {
            return Ok(Vec::new());
        };
        if !info.kind.is_abstract() {
            return Ok(vec![info]);
        }
        let implementations = self.find_implementations(type_name, true)?;
        let managed: Vec<TypeInfo> = implementations
            .iter()
            .filter(|ty| self.is_managed_component(ty))
            .cloned()
            .collect();
        if managed.is_empty() {
            Ok(implementations)
        } else {
            Ok(managed)
        }
    }

    /// Concrete methods a call to the abstract `method` dispatches to: the
    /// primary implementation's override if there is one, otherwise one per
    /// injection candidate. Empty when nothing overrides it.
    pub fn dispatch_targets(&self, method: &MethodInfo) -> Result<Vec<MethodInfo>> {
        if let Some(primary) = self.get_primary_implementation(&method.owner)? {
            if let Some(found) = self.override_in(&primary.qualified_name, method)? {
                return Ok(vec![found]);
            }
        }
        let mut targets = Vec::new();
        for candidate in self.resolve_injected_type(&method.owner)? {
            if candidate.qualified_name == method.owner {
                continue;
            }
            if let Some(found) = self.override_in(&candidate.qualified_name, method)? {
                targets.push(found);
            }
        }
        Ok(targets)
    }

    /// Declarations with the same signature in any supertype of the owner,
    /// nearest first.
    pub fn find_super_methods(&self, method: &MethodInfo) -> Result<Vec<MethodInfo>> {
        let mut found = Vec::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        seen.insert(method.owner.clone());
        queue.push_back(method.owner.clone());
        while let Some(current) = queue.pop_front() {
            let Some(info) = self.index.type_info(&current)? else {
                continue;
            };
            for supertype in info.supertypes {
                if !seen.insert(supertype.clone()) {
                    continue;
                }
                found.extend(
                    self.index
                        .methods_of(&supertype)?
                        .into_iter()
                        .filter(|candidate| candidate.same_signature(method)),
                );
                queue.push_back(supertype);
            }
        }
        Ok(found)
    }

    /// Whether calls to `method` go through an interface or abstract declaration.
    pub fn is_abstract_target(&self, method: &MethodInfo) -> Result<bool> {
        if method.is_abstract {
            return Ok(true);
        }
        Ok(self
            .index
            .type_info(&method.owner)?
            .is_some_and(|t| t.kind == TypeKind::Interface))
    }

    fn override_in(&self, type_name: &str, method: &MethodInfo) -> Result<Option<MethodInfo>> {
        Ok(self
            .index
            .methods_of(type_name)?
            .into_iter()
            .find(|candidate| candidate.same_signature(method) && !candidate.is_abstract))
    }
}
