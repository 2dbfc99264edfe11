mod common;

use common::{registry, setup_db, Address, City, Person};
use exemplar_core::query::{compile, introspect, Operator, SkipReason};
use exemplar_core::{
    AccessError, AttrValue, CrudOrchestrator, Mapped, MatchMode, RepoError, Scalar, Session,
    SortTerm,
};

struct Ghost;

impl Mapped for Ghost {
    fn type_name(&self) -> &'static str {
        "Ghost"
    }

    fn read(&self, _attribute: &str) -> Result<AttrValue<'_>, AccessError> {
        Err(AccessError::Missing)
    }
}

fn condition_paths(person: &Person) -> Vec<String> {
    compile(&registry(), person, MatchMode::Pattern)
        .unwrap()
        .conditions()
        .iter()
        .map(|condition| condition.path.clone())
        .collect()
}

#[test]
fn empty_filter_has_no_conditions_and_matches_every_row() {
    let registry = registry();
    let plan = compile(&registry, &Person::default(), MatchMode::Pattern).unwrap();
    assert!(plan.conditions().is_empty());
    assert!(plan.aliases().is_empty());

    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    people
        .insert_all(
            &mut session,
            &[Person::named("Ana"), Person::named("Bruno"), Person::named("Caio")],
        )
        .unwrap();

    let all = people
        .find_list(&mut session, &Person::default(), MatchMode::Pattern)
        .unwrap();
    assert_eq!(all.len(), 3);
}

#[test]
fn zero_identity_is_unset_and_non_zero_identity_restricts() {
    assert!(condition_paths(&Person::default()).is_empty());

    let plan = compile(
        &registry(),
        &Person {
            id: 5,
            ..Person::default()
        },
        MatchMode::Pattern,
    )
    .unwrap();
    assert_eq!(plan.conditions().len(), 1);
    let condition = &plan.conditions()[0];
    assert_eq!(condition.path, "id");
    assert_eq!(condition.operator, Operator::Eq);
    assert_eq!(condition.value, Scalar::Integer(5));
}

#[test]
fn related_entity_attributes_restrict_like_root_attributes() {
    let unsaved = Person {
        city: Some(City::named("Lisboa")),
        ..Person::default()
    };
    assert_eq!(condition_paths(&unsaved), vec!["city.name".to_string()]);

    let saved = Person {
        city: Some(City {
            id: 3,
            name: "Lisboa".to_string(),
            resident_ids: vec![1, 2],
        }),
        ..Person::default()
    };
    assert_eq!(
        condition_paths(&saved),
        vec!["city.id".to_string(), "city.name".to_string()]
    );
}

#[test]
fn filter_on_related_text_selects_only_matching_rows() {
    let registry = registry();
    let conn = setup_db();
    let cities = CrudOrchestrator::<City>::new(&registry).unwrap();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);

    let lisboa = cities.insert_returning(&mut session, &City::named("Lisboa")).unwrap();
    let porto = cities.insert_returning(&mut session, &City::named("Porto")).unwrap();
    people
        .insert_all(
            &mut session,
            &[
                Person {
                    city: Some(lisboa),
                    ..Person::named("Ana")
                },
                Person {
                    city: Some(porto),
                    ..Person::named("Rui")
                },
            ],
        )
        .unwrap();

    let filter = Person {
        city: Some(City::named("lis")),
        ..Person::default()
    };
    let found = people
        .find_list(&mut session, &filter, MatchMode::Pattern)
        .unwrap();
    let names = found.iter().map(|person| person.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["Ana"]);
}

#[test]
fn numeric_regular_attributes_never_restrict() {
    let filter = Person::named("Ana").with_age(30);
    assert_eq!(condition_paths(&filter), vec!["name".to_string()]);
}

#[test]
fn boolean_regular_attributes_restrict_by_equality() {
    let filter = Person {
        active: Some(false),
        ..Person::default()
    };
    let plan = compile(&registry(), &filter, MatchMode::Pattern).unwrap();
    assert_eq!(plan.conditions().len(), 1);
    assert_eq!(plan.conditions()[0].operator, Operator::Eq);
    assert_eq!(plan.conditions()[0].value, Scalar::Bool(false));
}

#[test]
fn text_uses_contains_in_pattern_mode_and_equality_in_exact_mode() {
    let filter = Person::named("ana");
    let registry = registry();

    let pattern = compile(&registry, &filter, MatchMode::Pattern).unwrap();
    assert_eq!(pattern.conditions()[0].operator, Operator::ContainsIgnoreCase);
    let exact = compile(&registry, &filter, MatchMode::Exact).unwrap();
    assert_eq!(exact.conditions()[0].operator, Operator::Eq);
}

#[test]
fn pattern_search_matches_case_insensitive_substring() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    people
        .insert_all(&mut session, &[Person::named("Ana Paula"), Person::named("Bruno")])
        .unwrap();

    let found = people
        .find_list(&mut session, &Person::named("ana"), MatchMode::Pattern)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Ana Paula");

    let exact = people
        .find_list(&mut session, &Person::named("ana"), MatchMode::Exact)
        .unwrap();
    assert!(exact.is_empty());
}

#[test]
fn pattern_search_folds_non_ascii_case() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    people
        .insert_all(
            &mut session,
            &[Person::named("JOÃO Silva"), Person::named("Joao Pereira")],
        )
        .unwrap();

    let found = people
        .find_list(&mut session, &Person::named("joão"), MatchMode::Pattern)
        .unwrap();
    let names = found.iter().map(|person| person.name.as_str()).collect::<Vec<_>>();
    assert_eq!(names, vec!["JOÃO Silva"]);
    assert_eq!(people.count(&mut session, &Person::named("SILVA")).unwrap(), 1);
}

#[test]
fn inherited_attribute_restricts_through_subtype() {
    let registry = registry();
    let filter = Person {
        nickname: Some("Nina".to_string()),
        ..Person::default()
    };
    let plan = compile(&registry, &filter, MatchMode::Exact).unwrap();
    assert_eq!(plan.conditions().len(), 1);
    assert_eq!(plan.conditions()[0].path, "nickname");
    assert_eq!(plan.conditions()[0].operator, Operator::Eq);

    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    people
        .insert_all(
            &mut session,
            &[
                Person {
                    nickname: Some("Nina".to_string()),
                    ..Person::named("Antonina")
                },
                Person {
                    nickname: Some("Bia".to_string()),
                    ..Person::named("Beatriz")
                },
            ],
        )
        .unwrap();
    let found = people
        .find_list(&mut session, &filter, MatchMode::Exact)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "Antonina");
}

#[test]
fn pattern_wildcards_in_filter_text_match_literally() {
    let registry = registry();
    let conn = setup_db();
    let people = CrudOrchestrator::<Person>::new(&registry).unwrap();
    let mut session = Session::new(&conn);
    people
        .insert_all(&mut session, &[Person::named("100% real"), Person::named("1000 real")])
        .unwrap();

    let found = people
        .find_list(&mut session, &Person::named("0%"), MatchMode::Pattern)
        .unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "100% real");
}

#[test]
fn embedded_paths_bind_every_prefix_but_the_leaf() {
    let filter = Person {
        address: Some(Address {
            street: Some("Rua Augusta".to_string()),
            city: Some(City::with_id(7)),
        }),
        ..Person::default()
    };
    let plan = compile(&registry(), &filter, MatchMode::Pattern).unwrap();
    let paths = plan
        .conditions()
        .iter()
        .map(|condition| condition.path.as_str())
        .collect::<Vec<_>>();
    assert_eq!(paths, vec!["address.street", "address.city.id"]);

    let aliases = plan
        .aliases()
        .iter()
        .map(|binding| (binding.path.as_str(), binding.alias.as_str()))
        .collect::<Vec<_>>();
    assert_eq!(
        aliases,
        vec![("address", "address"), ("address.city", "address__city")]
    );
}

#[test]
fn sort_path_through_relation_adds_aliases_without_leaf_binding() {
    let plan = compile(&registry(), &Person::default(), MatchMode::Pattern)
        .unwrap()
        .with_sort(Some(SortTerm::asc("address.city.name")));
    let bound = plan
        .aliases()
        .iter()
        .map(|binding| binding.path.as_str())
        .collect::<Vec<_>>();
    assert_eq!(bound, vec!["address", "address.city"]);
}

#[test]
fn unregistered_filter_type_is_rejected() {
    let err = compile(&registry(), &Ghost, MatchMode::Pattern).unwrap_err();
    assert!(matches!(err, RepoError::UnregisteredEntity("Ghost")));

    let introspection = introspect(&registry(), &Ghost);
    assert!(introspection.entries.is_empty());
    assert_eq!(
        introspection.diagnostics[0].reason,
        SkipReason::UnregisteredType("Ghost")
    );
}
