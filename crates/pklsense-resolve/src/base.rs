//! The implicit base module
//!
//! Every module sees the declarations of `pkl:base` as its outermost scope.
//! Only signatures matter for analysis, so members carry types and no bodies.

use pklsense_core::syntax::{
    AliasSource, ClassSource, MethodSource, Modifier, ModuleBuilder, PropertySource,
    TypeParamSource,
};
use pklsense_core::{ModuleSource, TypeRef};

pub const BASE_URI: &str = "pkl:base";

/// Parse a signature written in this file; all of them are known to be valid
fn ty(annotation: &str) -> TypeRef {
    TypeRef::parse(annotation).unwrap_or_else(|e| {
        tracing::warn!("invalid base annotation '{}': {}", annotation, e);
        TypeRef::Unknown
    })
}

fn property(name: &str, annotation: &str) -> PropertySource {
    PropertySource::new(name)
        .ty(ty(annotation))
        .modifier(Modifier::External)
}

fn method(name: &str, params: &[(&str, &str)], returns: &str) -> MethodSource {
    params
        .iter()
        .fold(MethodSource::new(name), |m, (param, annotation)| {
            m.param(*param, ty(annotation))
        })
        .returns(ty(returns))
        .modifier(Modifier::External)
}

fn class(name: &str) -> ClassSource {
    ClassSource::new(name).modifier(Modifier::External)
}

fn abstract_class(name: &str) -> ClassSource {
    class(name).modifier(Modifier::Abstract)
}

fn collection_members(class: ClassSource, own: &str) -> ClassSource {
    class
        .property(property("length", "Int"))
        .property(property("isEmpty", "Boolean"))
        .property(property("first", "Element"))
        .property(property("firstOrNull", "Element?"))
        .property(property("last", "Element"))
        .property(property("lastOrNull", "Element?"))
        .method(method("contains", &[("element", "Any")], "Boolean"))
        .method(method("getOrNull", &[("index", "Int")], "Element?"))
        .method(method(
            "filter",
            &[("predicate", "(Element) -> Boolean")],
            &format!("{}<Element>", own),
        ))
        .method(
            method(
                "map",
                &[("transform", "(Element) -> Result")],
                &format!("{}<Result>", own),
            )
            .type_param(TypeParamSource::new("Result")),
        )
        .method(method("join", &[("separator", "String")], "String"))
        .method(method("toList", &[], "List<Element>"))
        .method(method("toSet", &[], "Set<Element>"))
        .method(method("toListing", &[], "Listing<Element>"))
}

fn function_class(arity: usize) -> ClassSource {
    let mut class = class(&format!("Function{}", arity)).extends(ty("Function"));
    let mut params = Vec::new();
    for i in 1..=arity {
        class = class.type_param(TypeParamSource::contra(format!("Param{}", i)));
        params.push((format!("p{}", i), format!("Param{}", i)));
    }
    let params: Vec<(&str, &str)> = params
        .iter()
        .map(|(name, annotation)| (name.as_str(), annotation.as_str()))
        .collect();
    class
        .type_param(TypeParamSource::out("Result"))
        .method(method("apply", &params, "Result"))
}

/// Signatures of the base module
pub fn base_module() -> ModuleSource {
    let mut module = ModuleBuilder::new(BASE_URI)
        .name("base")
        .class(
            abstract_class("Any")
                .method(method("getClass", &[], "Class"))
                .method(method("toString", &[], "String"))
                .method(method("ifNonNull", &[("transform", "(Any) -> Any")], "Any")),
        )
        .class(class("Class").property(property("simpleName", "String")))
        .class(class("Null"))
        .class(
            class("Boolean")
                .method(method("xor", &[("other", "Boolean")], "Boolean"))
                .method(method("implies", &[("other", "Boolean")], "Boolean")),
        )
        .class(
            class("String")
                .property(property("length", "Int"))
                .property(property("isEmpty", "Boolean"))
                .property(property("isBlank", "Boolean"))
                .property(property("chars", "List<String>"))
                .method(method("contains", &[("pattern", "String|Regex")], "Boolean"))
                .method(method("startsWith", &[("pattern", "String|Regex")], "Boolean"))
                .method(method("endsWith", &[("pattern", "String")], "Boolean"))
                .method(method("split", &[("pattern", "String|Regex")], "List<String>"))
                .method(method("toUpperCase", &[], "String"))
                .method(method("toLowerCase", &[], "String"))
                .method(method("trim", &[], "String"))
                .method(method("toInt", &[], "Int"))
                .method(method("toFloat", &[], "Float"))
                .method(method("toBoolean", &[], "Boolean")),
        )
        .class(
            abstract_class("Number")
                .property(property("sign", "Number"))
                .property(property("abs", "Number"))
                .property(property("isPositive", "Boolean"))
                .property(property("isNaN", "Boolean"))
                .method(method("toInt", &[], "Int"))
                .method(method("toFloat", &[], "Float"))
                .method(method("round", &[], "Number"))
                .method(method("isBetween", &[("start", "Number"), ("inclusiveEnd", "Number")], "Boolean")),
        )
        .class(
            class("Int")
                .extends(ty("Number"))
                .property(property("isEven", "Boolean"))
                .property(property("isOdd", "Boolean"))
                .method(method("toChar", &[], "String")),
        )
        .class(
            class("Float")
                .extends(ty("Number"))
                .property(property("isFinite", "Boolean")),
        )
        .class(
            class("Duration")
                .property(property("value", "Number"))
                .property(property("unit", "DurationUnit"))
                .method(method("toUnit", &[("unit", "DurationUnit")], "Duration")),
        )
        .class(
            class("DataSize")
                .property(property("value", "Number"))
                .property(property("unit", "DataSizeUnit"))
                .method(method("toUnit", &[("unit", "DataSizeUnit")], "DataSize")),
        )
        .class(
            abstract_class("Object")
                .method(method("getProperty", &[("name", "String")], "unknown"))
                .method(method("getPropertyOrNull", &[("name", "String")], "unknown"))
                .method(method("hasProperty", &[("name", "String")], "Boolean")),
        )
        .class(
            abstract_class("Typed")
                .extends(ty("Object"))
                .method(method("toDynamic", &[], "Dynamic"))
                .method(method("toMap", &[], "Map<String, unknown>")),
        )
        .class(
            class("Dynamic")
                .extends(ty("Object"))
                .method(method("toMap", &[], "Map<unknown, unknown>"))
                .method(method("toList", &[], "List<unknown>"))
                .method(method("length", &[], "Int")),
        )
        .class(
            abstract_class("Module")
                .extends(ty("Typed"))
                .property(property("output", "ModuleOutput"))
                .method(method("relativePathTo", &[("other", "Module")], "List<String>")),
        )
        .class(
            class("ModuleOutput")
                .extends(ty("Typed"))
                .property(property("text", "String"))
                .property(property("value", "Any"))
                .property(property("files", "Mapping<String, FileOutput>?")),
        )
        .class(
            class("FileOutput")
                .extends(ty("Typed"))
                .property(property("text", "String"))
                .property(property("value", "Any")),
        )
        .class(
            class("Listing")
                .extends(ty("Object"))
                .type_param(TypeParamSource::out("Element"))
                .property(property("length", "Int"))
                .property(property("isEmpty", "Boolean"))
                .property(property("isDistinct", "Boolean"))
                .property(property("default", "(Int) -> Element"))
                .method(method("toList", &[], "List<Element>"))
                .method(method("toSet", &[], "Set<Element>"))
                .method(method("join", &[("separator", "String")], "String"))
                .method(method("distinct", &[], "Listing<Element>")),
        )
        .class(
            class("Mapping")
                .extends(ty("Object"))
                .type_param(TypeParamSource::out("Key"))
                .type_param(TypeParamSource::out("Value"))
                .property(property("length", "Int"))
                .property(property("isEmpty", "Boolean"))
                .property(property("keys", "Set<Key>"))
                .property(property("default", "(Key) -> Value"))
                .method(method("containsKey", &[("key", "Any")], "Boolean"))
                .method(method("getOrNull", &[("key", "Any")], "Value?"))
                .method(method("toMap", &[], "Map<Key, Value>")),
        )
        .class(collection_members(
            abstract_class("Collection").type_param(TypeParamSource::out("Element")),
            "Collection",
        ))
        .class(
            collection_members(
                class("List")
                    .extends(ty("Collection<Element>"))
                    .type_param(TypeParamSource::out("Element")),
                "List",
            )
            .property(property("isDistinct", "Boolean"))
            .method(method("reverse", &[], "List<Element>"))
            .method(method("distinct", &[], "List<Element>")),
        )
        .class(
            collection_members(
                class("Set")
                    .extends(ty("Collection<Element>"))
                    .type_param(TypeParamSource::out("Element")),
                "Set",
            )
            .method(method("union", &[("other", "Set<Element>")], "Set<Element>"))
            .method(method("intersect", &[("other", "Set<Element>")], "Set<Element>")),
        )
        .class(
            class("Map")
                .type_param(TypeParamSource::out("Key"))
                .type_param(TypeParamSource::out("Value"))
                .property(property("length", "Int"))
                .property(property("isEmpty", "Boolean"))
                .property(property("keys", "Set<Key>"))
                .property(property("values", "List<Value>"))
                .method(method("containsKey", &[("key", "Any")], "Boolean"))
                .method(method("getOrNull", &[("key", "Any")], "Value?"))
                .method(method("toMapping", &[], "Mapping<Key, Value>")),
        )
        .class(
            class("Pair")
                .type_param(TypeParamSource::out("First"))
                .type_param(TypeParamSource::out("Second"))
                .property(property("first", "First"))
                .property(property("second", "Second"))
                .property(property("key", "First"))
                .property(property("value", "Second")),
        )
        .class(
            class("Regex")
                .property(property("pattern", "String"))
                .method(method("matchEntire", &[("input", "String")], "RegexMatch?")),
        )
        .class(
            class("RegexMatch")
                .property(property("value", "String"))
                .property(property("start", "Int"))
                .property(property("end", "Int")),
        )
        .class(
            class("IntSeq")
                .property(property("start", "Int"))
                .property(property("end", "Int"))
                .property(property("step", "Int"))
                .method(method("toList", &[], "List<Int>")),
        )
        .class(abstract_class("Function"));

    for arity in 0..=pklsense_core::table::MAX_FUNCTION_ARITY {
        module = module.class(function_class(arity));
    }

    for (name, target) in [
        ("Int8", "Int"),
        ("Int16", "Int"),
        ("Int32", "Int"),
        ("UInt8", "Int"),
        ("UInt16", "Int"),
        ("UInt32", "Int"),
        ("UInt", "Int"),
        ("Comparable", "String|Number|Duration|DataSize"),
        ("NonNull", "Any"),
        ("DurationUnit", "\"ns\"|\"us\"|\"ms\"|\"s\"|\"min\"|\"h\"|\"d\""),
        (
            "DataSizeUnit",
            "\"b\"|\"kb\"|\"kib\"|\"mb\"|\"mib\"|\"gb\"|\"gib\"|\"tb\"|\"tib\"|\"pb\"|\"pib\"",
        ),
    ] {
        module = module.typealias(AliasSource::new(name, ty(target)));
    }
    module = module.typealias(
        AliasSource::new("Mixin", ty("(Type) -> Type")).type_param(TypeParamSource::new("Type")),
    );

    module
        .property(property("NaN", "Float"))
        .property(property("Infinity", "Float"))
        .method(
            method("List", &[], "List<Element>").type_param(TypeParamSource::new("Element")),
        )
        .method(method("Set", &[], "Set<Element>").type_param(TypeParamSource::new("Element")))
        .method(
            method("Map", &[], "Map<Key, Value>")
                .type_param(TypeParamSource::new("Key"))
                .type_param(TypeParamSource::new("Value")),
        )
        .method(
            method("Pair", &[("first", "First"), ("second", "Second")], "Pair<First, Second>")
                .type_param(TypeParamSource::new("First"))
                .type_param(TypeParamSource::new("Second")),
        )
        .method(method("IntSeq", &[("start", "Int"), ("end", "Int")], "IntSeq"))
        .method(method("Regex", &[("pattern", "String")], "Regex"))
        .method(method("Null", &[("defaultValue", "Object")], "Null"))
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pklsense_core::syntax::NodeKind;
    use pklsense_core::SyntaxTree;

    #[test]
    fn test_base_declarations_present() {
        let tree = SyntaxTree::lower(&base_module(), 1);
        for name in ["Any", "Listing", "Mapping", "Function3", "Comparable", "UInt8", "Mixin"] {
            assert!(tree.find_type_decl(name).is_some(), "missing {}", name);
        }
        assert!(tree.find_member("String.length").is_some());
        assert!(tree.find_member("List").is_some());
    }

    #[test]
    fn test_base_annotations_parse() {
        let tree = SyntaxTree::lower(&base_module(), 1);
        for id in tree.node_ids() {
            if let NodeKind::Property(header) = tree.kind(id) {
                assert_ne!(header.ty, Some(TypeRef::Unknown), "{}", header.name);
            }
        }
    }
}
