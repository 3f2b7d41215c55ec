//! Lattice laws and the documented subtyping scenarios

use pklsense_core::table::{out, param};
use pklsense_core::{Type, TypeEnv, TypeTable};
use proptest::prelude::*;

const PROPTEST_CASES: u32 = 256;

/// Symbolic type, turned into a real `Type` against a table
#[derive(Clone, Debug)]
enum Shape {
    Named(&'static str),
    Literal(&'static str),
    Unknown,
    Nullable(Box<Shape>),
    Union(Vec<Shape>),
    Listing(Box<Shape>),
    Mapping(Box<Shape>, Box<Shape>),
    Function(Vec<Shape>, Box<Shape>),
}

fn arb_shape() -> impl Strategy<Value = Shape> {
    let leaf = prop_oneof![
        6 => prop::sample::select(vec![
            "Any", "Null", "String", "Int", "Float", "Number", "Boolean", "Dynamic",
        ])
        .prop_map(Shape::Named),
        2 => prop::sample::select(vec!["a", "b"]).prop_map(Shape::Literal),
        1 => Just(Shape::Unknown),
    ];
    leaf.prop_recursive(3, 24, 3, |inner| {
        prop_oneof![
            inner.clone().prop_map(|s| Shape::Nullable(Box::new(s))),
            prop::collection::vec(inner.clone(), 2..4).prop_map(Shape::Union),
            inner.clone().prop_map(|s| Shape::Listing(Box::new(s))),
            (inner.clone(), inner.clone())
                .prop_map(|(k, v)| Shape::Mapping(Box::new(k), Box::new(v))),
            (prop::collection::vec(inner.clone(), 0..3), inner)
                .prop_map(|(params, ret)| Shape::Function(params, Box::new(ret))),
        ]
    })
}

fn build(shape: &Shape, table: &TypeTable) -> Type {
    let base = table.base();
    match shape {
        Shape::Named(name) => table.ty(name, vec![]),
        Shape::Literal(text) => Type::string_literal(text),
        Shape::Unknown => Type::Unknown,
        Shape::Nullable(inner) => Type::nullable(build(inner, table), base),
        Shape::Union(members) => Type::union(members.iter().map(|m| build(m, table)), base),
        Shape::Listing(element) => table.ty("Listing", vec![build(element, table)]),
        Shape::Mapping(key, value) => {
            table.ty("Mapping", vec![build(key, table), build(value, table)])
        }
        Shape::Function(params, ret) => Type::function(
            params.iter().map(|p| build(p, table)).collect(),
            build(ret, table),
        ),
    }
}

fn has_nested_union(ty: &Type) -> bool {
    match ty {
        Type::Union(members) => members
            .iter()
            .any(|m| matches!(m, Type::Union(_) | Type::Nullable(_) | Type::Unknown)),
        _ => false,
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(PROPTEST_CASES))]

    #[test]
    fn unknown_is_absorbing(shape in arb_shape()) {
        let table = TypeTable::with_base();
        let ty = build(&shape, &table);
        prop_assert!(ty.is_subtype_of(&Type::Unknown, &table));
        prop_assert!(Type::Unknown.is_subtype_of(&ty, &table));
    }

    #[test]
    fn subtyping_is_reflexive(shape in arb_shape()) {
        let table = TypeTable::with_base();
        let ty = build(&shape, &table);
        prop_assert!(ty.is_subtype_of(&ty, &table));
        let nullable = Type::nullable(ty.clone(), table.base());
        prop_assert!(nullable.is_subtype_of(&nullable, &table));
        prop_assert!(ty.is_subtype_of(&nullable, &table));
    }

    #[test]
    fn unions_are_normalized(a in arb_shape(), b in arb_shape()) {
        let table = TypeTable::with_base();
        let (a, b) = (build(&a, &table), build(&b, &table));
        let union = Type::union([a.clone(), b.clone()], table.base());
        prop_assert!(!has_nested_union(&union));
        if let Type::Nullable(inner) = &union {
            prop_assert!(!matches!(inner.as_ref(), Type::Nullable(_)));
            prop_assert!(!table.base().is_null(inner));
        }
        prop_assert!(a.is_subtype_of(&union, &table));
        prop_assert!(b.is_subtype_of(&union, &table));
    }

    #[test]
    fn nullable_is_idempotent(shape in arb_shape()) {
        let table = TypeTable::with_base();
        let once = Type::nullable(build(&shape, &table), table.base());
        let twice = Type::nullable(once.clone(), table.base());
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn subtypes_share_a_common_subtype(a in arb_shape(), b in arb_shape()) {
        let table = TypeTable::with_base();
        let (a, b) = (build(&a, &table), build(&b, &table));
        if a.is_subtype_of(&b, &table) && a != Type::Nothing {
            prop_assert!(a.has_common_subtype_with(&b, &table));
        }
    }
}

#[test]
fn list_of_unknown_and_list_of_string_are_mutual_subtypes() {
    let table = TypeTable::with_base();
    let list_unknown = table.ty("List", vec![Type::Unknown]);
    let list_string = table.ty("List", vec![table.ty("String", vec![])]);
    assert!(list_unknown.is_subtype_of(&list_string, &table));
    assert!(list_string.is_subtype_of(&list_unknown, &table));
}

#[test]
fn mapping_values_are_covariant() {
    let mut table = TypeTable::with_base();
    let value_renderer = table.class("ValueRenderer", None);
    let renderer = table.class(
        "Renderer",
        Some(Type::class(value_renderer.clone(), vec![])),
    );
    let key = table.ty("String", vec![]);
    let general = table.ty(
        "Mapping",
        vec![key.clone(), Type::class(value_renderer, vec![])],
    );
    let specific = table.ty("Mapping", vec![key, Type::class(renderer, vec![])]);

    assert!(specific.is_subtype_of(&general, &table));
    assert!(!general.is_subtype_of(&specific, &table));
}

#[test]
fn function_parameters_are_contravariant() {
    let mut table = TypeTable::with_base();
    let a = table.class("A", None);
    let b = table.class("B", None);
    let sub = table.class("Sub", Some(Type::class(a.clone(), vec![])));
    let string = table.ty("String", vec![]);
    let function1 = |param: Type| table.ty("Function1", vec![param, string.clone()]);

    let takes_a = function1(Type::class(a.clone(), vec![]));
    let takes_b = function1(Type::class(b.clone(), vec![]));
    assert!(!takes_a.is_subtype_of(&takes_b, &table));
    assert!(!takes_b.is_subtype_of(&takes_a, &table));
    assert!(takes_a.has_common_subtype_with(&takes_b, &table));

    // accepting a supertype makes a subtype
    let takes_sub = function1(Type::class(sub, vec![]));
    assert!(takes_a.is_subtype_of(&takes_sub, &table));
    assert!(!takes_sub.is_subtype_of(&takes_a, &table));

    let lambda = Type::function(vec![Type::class(a, vec![])], string.clone());
    assert!(lambda.is_subtype_of(&takes_sub, &table));
    assert!(takes_sub.is_subtype_of(
        &Type::function(vec![table.ty("Sub", vec![])], string.clone()),
        &table
    ));
    assert!(lambda.is_subtype_of(&table.ty("Function", vec![]), &table));
    assert!(!lambda.is_subtype_of(&Type::function(vec![], string.clone()), &table));

    let returns_int = Type::function(vec![Type::class(b, vec![])], table.ty("Int", vec![]));
    assert!(!lambda.has_common_subtype_with(&returns_int, &table));
}

#[test]
fn alias_to_union_is_equivalent_to_the_union() {
    let mut table = TypeTable::with_base();
    let base = table.base().clone();
    let string_or_int = Type::union(
        [table.ty("String", vec![]), table.ty("Int", vec![])],
        &base,
    );
    table.alias("StringOrInt", string_or_int.clone());
    let alias = table.ty("StringOrInt", vec![]);

    assert!(alias.is_subtype_of(&string_or_int, &table));
    assert!(string_or_int.is_subtype_of(&alias, &table));
    assert!(alias.is_equivalent_to(&string_or_int, &table));
    assert!(!alias.is_subtype_of(&table.ty("String", vec![]), &table));
}

#[test]
fn generic_alias_substitutes_arguments() {
    let mut table = TypeTable::with_base();
    let base = table.base().clone();
    let pairs = table.reserve("Pairs");
    let target = table.ty("Listing", vec![param(&pairs, 0, "T")]);
    table.define_alias(&pairs, vec![out("T")], target);

    let of_int = Type::Alias {
        alias: pairs.clone(),
        args: vec![table.ty("Int", vec![])],
    };
    let of_string = Type::Alias {
        alias: pairs,
        args: vec![base.string_type()],
    };
    assert!(of_int.is_subtype_of(&table.ty("Listing", vec![table.ty("Number", vec![])]), &table));
    assert!(!of_int.is_subtype_of(&of_string, &table));
    assert_eq!(of_int.to_string(), "Pairs<Int>");
}

#[test]
fn cyclic_aliases_degrade_to_unknown() {
    let mut table = TypeTable::with_base();
    let a = table.reserve("A");
    let b = table.reserve("B");
    table.define_alias(&a, vec![], Type::Alias { alias: b.clone(), args: vec![] });
    table.define_alias(&b, vec![], Type::Alias { alias: a.clone(), args: vec![] });

    let a = Type::Alias { alias: a, args: vec![] };
    assert_eq!(a.expand_aliases(&table), Type::Unknown);
    assert!(a.is_subtype_of(&table.ty("Int", vec![]), &table));
}

#[test]
fn self_referential_generic_alias_terminates() {
    let mut table = TypeTable::with_base();
    let base = table.base().clone();
    let tree = table.reserve("Tree");
    let nested = Type::union(
        [
            base.string_type(),
            table.ty("Listing", vec![Type::Alias { alias: tree.clone(), args: vec![] }]),
        ],
        &base,
    );
    table.define_alias(&tree, vec![], nested);
    let tree = Type::Alias { alias: tree, args: vec![] };

    assert!(tree.is_subtype_of(&tree.clone(), &table));
    let listing_of_tree = table.ty("Listing", vec![tree.clone()]);
    assert!(listing_of_tree.is_subtype_of(&tree, &table));
    assert!(!table.ty("Int", vec![]).is_subtype_of(&tree, &table));
}

#[test]
fn nullable_normalization() {
    let table = TypeTable::with_base();
    let base = table.base();
    let int = table.ty("Int", vec![]);
    let string = table.ty("String", vec![]);
    let null = base.null_type();

    assert_eq!(
        Type::union([int.clone(), null.clone()], base),
        Type::Nullable(Box::new(int.clone()))
    );
    assert_eq!(
        Type::union([int.clone(), null.clone(), string.clone()], base),
        Type::Nullable(Box::new(Type::Union(vec![int.clone(), string])))
    );
    assert_eq!(Type::nullable(Type::Unknown, base), Type::Unknown);
    assert_eq!(Type::nullable(null.clone(), base), null);
    assert_eq!(Type::union([int.clone()], base), int);
    assert_eq!(Type::union(Vec::new(), base), Type::Nothing);
    assert_eq!(Type::nullable(int.clone(), base).to_string(), "Int?");
}
