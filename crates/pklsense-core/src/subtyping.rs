//! Subtype and common-subtype queries over the type lattice

use std::collections::HashSet;

use crate::syntax::Variance;
use crate::types::{DeclRef, Type, TypeEnv};

/// Recursion bound past which a query answers permissively
const MAX_DEPTH: usize = 96;

pub fn is_subtype_of(candidate: &Type, target: &Type, env: &dyn TypeEnv) -> bool {
    Relations::new(env).is_subtype(candidate, target)
}

/// True iff some inhabited type is a subtype of both `a` and `b`
pub fn has_common_subtype(a: &Type, b: &Type, env: &dyn TypeEnv) -> bool {
    Relations::new(env).common_subtype(a, b)
}

struct Relations<'a> {
    env: &'a dyn TypeEnv,
    /// Pairs currently being proven; revisiting one assumes it holds
    assumed: HashSet<(Type, Type)>,
    depth: usize,
}

impl<'a> Relations<'a> {
    fn new(env: &'a dyn TypeEnv) -> Self {
        Self {
            env,
            assumed: HashSet::new(),
            depth: 0,
        }
    }

    fn is_subtype(&mut self, candidate: &Type, target: &Type) -> bool {
        if candidate == target {
            return true;
        }
        match (candidate, target) {
            (Type::Unknown, _) | (_, Type::Unknown) => return true,
            (Type::Parameter(_), _) | (_, Type::Parameter(_)) => return true,
            (Type::Nothing, _) => return true,
            (_, Type::Nothing) => return false,
            _ => {}
        }
        if self.depth >= MAX_DEPTH {
            tracing::debug!("subtype depth limit reached: {} <: {}", candidate, target);
            return true;
        }
        let key = (candidate.clone(), target.clone());
        if !self.assumed.insert(key.clone()) {
            return true;
        }
        self.depth += 1;
        let result = self.is_subtype_uncached(candidate, target);
        self.depth -= 1;
        self.assumed.remove(&key);
        result
    }

    fn is_subtype_uncached(&mut self, candidate: &Type, target: &Type) -> bool {
        let env = self.env;
        let base = env.base();
        match (candidate, target) {
            (Type::Alias { .. }, _) => {
                let expanded = candidate.expand_aliases(env);
                self.is_subtype(&expanded, target)
            }
            (_, Type::Alias { .. }) => {
                let expanded = target.expand_aliases(env);
                self.is_subtype(candidate, &expanded)
            }
            (Type::Union(members), _) => members.iter().all(|m| self.is_subtype(m, target)),
            (Type::Nullable(inner), _) => {
                self.is_subtype(inner, target) && self.is_subtype(&base.null_type(), target)
            }
            (_, Type::Union(members)) => members.iter().any(|m| self.is_subtype(candidate, m)),
            (_, Type::Nullable(inner)) => base.is_null(candidate) || self.is_subtype(candidate, inner),
            (Type::StringLiteral(_), Type::StringLiteral(_)) => false,
            (Type::StringLiteral(_), _) => self.is_subtype(&base.string_type(), target),
            (_, Type::StringLiteral(_)) => false,
            (
                Type::Function { params, ret },
                Type::Function {
                    params: target_params,
                    ret: target_ret,
                },
            ) => {
                params.len() == target_params.len()
                    && params
                        .iter()
                        .zip(target_params)
                        .all(|(p, tp)| self.is_subtype(tp, p))
                    && self.is_subtype(ret, target_ret)
            }
            (Type::Function { params, ret }, Type::Class { .. }) => {
                let view = base.function_class_view(params, ret);
                self.is_subtype(&view, target)
            }
            (Type::Class { .. }, Type::Function { params, ret }) => {
                let Some(class) = base.function_n.get(params.len()) else {
                    return false;
                };
                match candidate.instantiate_as_supertype(class, env) {
                    Some(args) => {
                        let arg = |i: usize| args.get(i).cloned().unwrap_or(Type::Unknown);
                        params
                            .iter()
                            .enumerate()
                            .all(|(i, p)| self.is_subtype(p, &arg(i)))
                            && self.is_subtype(&arg(params.len()), ret)
                    }
                    None => false,
                }
            }
            (
                Type::Class { .. },
                Type::Class {
                    class: target_class,
                    args: target_args,
                },
            ) => self.class_subtype(candidate, target_class, target_args),
            _ => false,
        }
    }

    fn class_subtype(&mut self, candidate: &Type, target: &DeclRef, target_args: &[Type]) -> bool {
        let Some(view) = candidate.instantiate_as_supertype(target, self.env) else {
            return false;
        };
        let def = self.env.class_def(target);
        let arity = view.len().max(target_args.len());
        (0..arity).all(|i| {
            let ours = view.get(i).cloned().unwrap_or(Type::Unknown);
            let theirs = target_args.get(i).cloned().unwrap_or(Type::Unknown);
            let variance = def.as_ref().map(|d| d.variance(i)).unwrap_or_default();
            match variance {
                Variance::Covariant => self.is_subtype(&ours, &theirs),
                Variance::Contravariant => self.is_subtype(&theirs, &ours),
                Variance::Invariant => {
                    self.is_subtype(&ours, &theirs) && self.is_subtype(&theirs, &ours)
                }
            }
        })
    }

    fn common_subtype(&mut self, a: &Type, b: &Type) -> bool {
        match (a, b) {
            (Type::Nothing, _) | (_, Type::Nothing) => return false,
            (Type::Unknown, _) | (_, Type::Unknown) => return true,
            (Type::Parameter(_), _) | (_, Type::Parameter(_)) => return true,
            _ if a == b => return true,
            _ => {}
        }
        if self.depth >= MAX_DEPTH {
            return true;
        }
        self.depth += 1;
        let result = self.common_subtype_uncached(a, b);
        self.depth -= 1;
        result
    }

    fn common_subtype_uncached(&mut self, a: &Type, b: &Type) -> bool {
        let env = self.env;
        let base = env.base();
        match (a, b) {
            (Type::Alias { .. }, _) => {
                let expanded = a.expand_aliases(env);
                self.common_subtype(&expanded, b)
            }
            (_, Type::Alias { .. }) => {
                let expanded = b.expand_aliases(env);
                self.common_subtype(a, &expanded)
            }
            (Type::Union(members), _) => members.iter().any(|m| self.common_subtype(m, b)),
            (_, Type::Union(members)) => members.iter().any(|m| self.common_subtype(a, m)),
            // both admit null
            (Type::Nullable(_), Type::Nullable(_)) => true,
            (Type::Nullable(inner), other) | (other, Type::Nullable(inner)) => {
                self.common_subtype(inner, other) || self.is_subtype(&base.null_type(), other)
            }
            (Type::StringLiteral(_), other) | (other, Type::StringLiteral(_)) => {
                let literal = if matches!(a, Type::StringLiteral(_)) { a } else { b };
                self.is_subtype(literal, other)
            }
            (
                Type::Function { params, ret },
                Type::Function {
                    params: other_params,
                    ret: other_ret,
                },
            ) => {
                // contravariant parameters always share the supertype `Any`
                params.len() == other_params.len() && self.common_subtype(ret, other_ret)
            }
            (Type::Function { params, ret }, Type::Class { .. }) => {
                let view = base.function_class_view(params, ret);
                self.common_subtype(&view, b)
            }
            (Type::Class { .. }, Type::Function { params, ret }) => {
                let view = base.function_class_view(params, ret);
                self.common_subtype(a, &view)
            }
            (Type::Class { class, args }, Type::Class { class: other, args: other_args }) => {
                if let Some(view) = a.instantiate_as_supertype(other, env) {
                    self.common_class_args(other, &view, other_args)
                } else if let Some(view) = b.instantiate_as_supertype(class, env) {
                    self.common_class_args(class, args, &view)
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    fn common_class_args(&mut self, class: &DeclRef, left: &[Type], right: &[Type]) -> bool {
        let def = self.env.class_def(class);
        let arity = left.len().max(right.len());
        (0..arity).all(|i| {
            let l = left.get(i).cloned().unwrap_or(Type::Unknown);
            let r = right.get(i).cloned().unwrap_or(Type::Unknown);
            match def.as_ref().map(|d| d.variance(i)).unwrap_or_default() {
                Variance::Covariant => self.common_subtype(&l, &r),
                Variance::Contravariant => true,
                Variance::Invariant => self.is_subtype(&l, &r) && self.is_subtype(&r, &l),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::table::TypeTable;
    use crate::types::{Type, TypeEnv};

    #[test]
    fn test_base_lattice() {
        let table = TypeTable::with_base();
        let base = table.base().clone();
        let string = base.string_type();
        let int = base.class(&base.int);
        let number = base.class(&base.number);
        let any = base.any_type();
        let null = base.null_type();

        assert!(int.is_subtype_of(&number, &table));
        assert!(!number.is_subtype_of(&int, &table));
        assert!(string.is_subtype_of(&any, &table));
        assert!(null.is_subtype_of(&Type::nullable(string.clone(), &base), &table));
        assert!(!null.is_subtype_of(&string, &table));
        assert!(null.is_subtype_of(&any, &table));
        assert!(Type::string_literal("a").is_subtype_of(&string, &table));
        assert!(!string.is_subtype_of(&Type::string_literal("a"), &table));
        assert!(Type::Nothing.is_subtype_of(&int, &table));
    }

    #[test]
    fn test_nullable_rules() {
        let table = TypeTable::with_base();
        let base = table.base().clone();
        let int = base.class(&base.int);
        let number = base.class(&base.number);
        let int_opt = Type::nullable(int.clone(), &base);
        let number_opt = Type::nullable(number.clone(), &base);

        assert!(int_opt.is_subtype_of(&number_opt, &table));
        assert!(!number_opt.is_subtype_of(&int_opt, &table));
        assert!(int.is_subtype_of(&int_opt, &table));
        assert!(!int_opt.is_subtype_of(&int, &table));
    }

    #[test]
    fn test_common_subtype() {
        let table = TypeTable::with_base();
        let base = table.base().clone();
        let string = base.string_type();
        let int = base.class(&base.int);
        let number = base.class(&base.number);

        assert!(int.has_common_subtype_with(&number, &table));
        assert!(!int.has_common_subtype_with(&string, &table));
        assert!(Type::nullable(int.clone(), &base)
            .has_common_subtype_with(&Type::nullable(string.clone(), &base), &table));
        assert!(!Type::Nothing.has_common_subtype_with(&Type::Nothing, &table));
        assert!(Type::string_literal("x").has_common_subtype_with(&string, &table));
        assert!(!Type::string_literal("x").has_common_subtype_with(&Type::string_literal("y"), &table));

        let listing = |arg: Type| Type::class(base.listing.clone(), vec![arg]);
        assert!(listing(int.clone()).has_common_subtype_with(&listing(number), &table));
        assert!(!listing(int).has_common_subtype_with(&listing(string), &table));
    }
}
