//! Definitions injected next to the user's schema.
//!
//! Written as SDL so they flow through the same loader as the project
//! schema. Built-ins are flagged `built_in`, framework definitions `internal`.

/// Scalars and directives every GraphQL schema has.
pub const BUILT_IN_SDL: &str = r#"
scalar ID
scalar String
scalar Int
scalar Float
scalar Boolean

directive @skip(if: Boolean!) on FIELD | FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @include(if: Boolean!) on FIELD | FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @deprecated(reason: String) on FIELD_DEFINITION | ARGUMENT_DEFINITION | INPUT_FIELD_DEFINITION | ENUM_VALUE
directive @specifiedBy(url: String!) on SCALAR
"#;

/// Framework directives and the enums they take.
pub const INTERNAL_SDL: &str = r#"
enum CachePolicy {
    CacheOrNetwork
    CacheOnly
    NetworkOnly
    CacheAndNetwork
    NoCache
}

enum PaginateMode {
    Infinite
    SinglePage
}

enum DedupeMatchMode {
    Variables
    Operation
    None
}

directive @list(name: String!, connection: Boolean) on FIELD
directive @paginate(name: String, mode: PaginateMode) on FIELD
directive @prepend on FRAGMENT_SPREAD
directive @append on FRAGMENT_SPREAD
directive @parentID(value: ID!) on FRAGMENT_SPREAD
directive @allLists on FRAGMENT_SPREAD
directive @with on FRAGMENT_SPREAD
directive @arguments on FRAGMENT_DEFINITION
directive @componentField(field: String!, prop: String) on FRAGMENT_DEFINITION | INLINE_FRAGMENT
directive @required on FIELD
directive @loading(count: Int, cascade: Boolean) on QUERY | FRAGMENT_DEFINITION | FIELD | FRAGMENT_SPREAD | INLINE_FRAGMENT
directive @mask_enable on FRAGMENT_SPREAD
directive @mask_disable on FRAGMENT_SPREAD
directive @optimisticKey on FIELD
directive @runtimeScalar(type: String!) on VARIABLE_DEFINITION
directive @node on FIELD
directive @when on FRAGMENT_SPREAD
directive @when_not on FRAGMENT_SPREAD
directive @cache(policy: CachePolicy, partial: Boolean) on QUERY
directive @blocking on QUERY | FRAGMENT_DEFINITION
directive @blocking_disable on QUERY | FRAGMENT_DEFINITION
directive @dedupe(cancelFirst: Boolean, match: DedupeMatchMode) on QUERY | MUTATION
directive @load on QUERY
directive @manual_load on QUERY
"#;

/// Directive names, as used in documents.
pub mod names {
    pub const LIST: &str = "list";
    pub const PAGINATE: &str = "paginate";
    pub const PREPEND: &str = "prepend";
    pub const APPEND: &str = "append";
    pub const PARENT_ID: &str = "parentID";
    pub const ALL_LISTS: &str = "allLists";
    pub const WITH: &str = "with";
    pub const ARGUMENTS: &str = "arguments";
    pub const COMPONENT_FIELD: &str = "componentField";
    pub const REQUIRED: &str = "required";
    pub const LOADING: &str = "loading";
    pub const MASK_ENABLE: &str = "mask_enable";
    pub const MASK_DISABLE: &str = "mask_disable";
    pub const OPTIMISTIC_KEY: &str = "optimisticKey";
    pub const RUNTIME_SCALAR: &str = "runtimeScalar";
    pub const NODE: &str = "node";
    pub const WHEN: &str = "when";
    pub const WHEN_NOT: &str = "when_not";
}

/// Directives whose arguments are free-form.
pub const ARBITRARY_ARGUMENT_DIRECTIVES: [&str; 4] =
    [names::WITH, names::WHEN, names::WHEN_NOT, names::ARGUMENTS];

/// Name of the interface that marks globally refetchable types.
pub const NODE_INTERFACE: &str = "Node";

/// Field injected on every composite type.
pub const TYPENAME_FIELD: &str = "__typename";

/// Name of the fragment synthesized for an inline component field.
pub fn component_field_fragment_name(type_name: &str, field: &str) -> String {
    format!("__componentField__{type_name}_{field}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_internal_sdl_parses() {
        let doc = async_graphql_parser::parse_schema(INTERNAL_SDL).unwrap();
        assert!(doc.definitions.len() > 20);
        async_graphql_parser::parse_schema(BUILT_IN_SDL).unwrap();
    }

    #[test]
    fn test_component_field_fragment_name() {
        assert_eq!(component_field_fragment_name("User", "avatar"), "__componentField__User_avatar");
    }
}
