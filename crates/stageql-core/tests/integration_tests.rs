use rstest::{fixture, rstest};
use serde_json::json;
use stageql_core::{
    ArgType, ArgValue, ArgumentBinding, Capabilities, CompileError, Engine, Error, ExecutionError, Expr, FieldDef,
    FilterExtension, NoCapabilities, ObjectShape, Owner, PagingExtension, RequestArguments, SelectionTree,
    ServiceCall, Shape, SortExtension, Value, Variables,
};

struct Ratings {
    scale: i64,
}

fn person() -> Shape {
    Shape::object(
        ObjectShape::new("Person")
            .with_member("id", Shape::int())
            .with_member("name", Shape::string()),
    )
}

fn movie() -> Shape {
    Shape::object(
        ObjectShape::new("Movie")
            .with_member("id", Shape::int())
            .with_member("name", Shape::string())
            .with_member("year", Shape::int())
            .with_member("director", person()),
    )
}

fn query() -> Shape {
    Shape::object(ObjectShape::new("Query").with_member("movies", Shape::list(movie())))
}

#[fixture]
fn root() -> Value {
    Value::from(json!({
        "movies": [
            {"id": 1, "name": "Alien", "year": 1979, "director": {"id": 10, "name": "Scott"}},
            {"id": 2, "name": "Heat", "year": 1995, "director": {"id": 20, "name": "Mann"}},
            {"id": 3, "name": "Ronin", "year": 1998, "director": {"id": 30, "name": "Frankenheimer"}},
        ]
    }))
}

fn ratings() -> Capabilities {
    Capabilities::new().with(Ratings { scale: 10 })
}

fn none() -> RequestArguments {
    RequestArguments::new()
}

/// `movie(id: Int!)`: the movie with the given id.
fn movie_by_id() -> FieldDef {
    FieldDef::new("movie", movie(), |ctx, args| {
        ctx.clone()
            .member("movies")
            .find("m", |m| m.member("id").eq(args.expr("id")))
    })
    .with_argument(ArgumentBinding::new("id", ArgType::int().required()))
}

fn movies() -> FieldDef {
    FieldDef::member("movies", Shape::list(movie()))
}

fn rating() -> FieldDef {
    FieldDef::new("rating", Shape::int(), |ctx, _| {
        Expr::service(ServiceCall::new::<Ratings, _>(
            "rating",
            vec![ctx.clone().member("id")],
            Shape::int(),
            |ratings, args| Ok(Value::Int(args[0].as_i64().unwrap_or_default() * ratings.scale)),
        ))
    })
}

fn scalar(name: &str) -> FieldDef {
    FieldDef::member(name, movie().member(name).cloned().unwrap_or_default())
}

/// `movie(id: 2) { id name rating }`
fn movie_query() -> SelectionTree {
    let mut tree = SelectionTree::new(query());
    let movie = tree
        .add(Owner::Operation, &movie_by_id(), &none().with("id", 2), None)
        .unwrap();
    tree.add(Owner::Field(movie), &scalar("id"), &none(), None).unwrap();
    tree.add(Owner::Field(movie), &scalar("name"), &none(), None).unwrap();
    tree.add(Owner::Field(movie), &rating(), &none(), None).unwrap();
    tree
}

#[rstest]
fn test_movie_with_rating(root: Value) {
    let value = Engine::default().execute(&movie_query(), &root, &ratings()).unwrap();
    assert_eq!(
        value.map(|v| v.to_json()),
        Some(json!({"movie": {"id": 2, "name": "Heat", "rating": 20}}))
    );
}

#[rstest]
fn test_stage1_runs_without_capabilities(root: Value) {
    let compiled = Engine::default().compile(&movie_query());
    let stage1 = compiled
        .stage1()
        .executable()
        .unwrap()
        .run(&root, &NoCapabilities)
        .unwrap();

    let movie = stage1.member("movie");
    assert_eq!(movie.member("id"), Value::Int(2));
    assert_eq!(movie.member("name"), Value::from("Heat"));
    assert!(movie.member("rating").is_null());
    assert!(movie.as_object().is_some_and(|object| !object.contains("rating")));
}

#[rstest]
fn test_stage2_shape_is_a_superset(root: Value) {
    let compiled = Engine::default().compile(&movie_query());
    let without = compiled.execute(&root, &NoCapabilities);
    assert!(matches!(without, Err(ExecutionError::MissingCapability(_))));

    let value = compiled.execute(&root, &ratings()).unwrap().unwrap();
    let keys = value
        .member("movie")
        .as_object()
        .map(|object| object.keys().map(|k| k.to_string()).collect::<Vec<_>>())
        .unwrap_or_default();
    assert_eq!(keys, vec!["id", "name", "rating"]);
}

#[test]
fn test_stage2_reads_stage1_members() {
    let compiled = Engine::default().compile(&movie_query());
    let stage2 = compiled.stage2().unwrap();

    assert_eq!(
        stage2.expr().to_string(),
        "Query { movie: let $movie = $stage1.movie in Movie { id: $movie.id, name: $movie.name, rating: Ratings::rating($movie.__id) } }"
    );

    let Expr::Object { fields, .. } = stage2.expr() else {
        panic!("expected an object");
    };
    let Expr::Scope { param, value, body } = &fields[0].1 else {
        panic!("expected a scope");
    };
    let stage1_movie = stage2.param().shape().member("movie").cloned().unwrap();
    assert_eq!(**value, Expr::param(stage2.param()).member_as("movie", stage1_movie));

    let Expr::Object { fields, .. } = body.as_ref() else {
        panic!("expected an object");
    };
    assert_eq!(fields[1], ("name".into(), Expr::param(param).member_as("name", Shape::string())));
}

struct Echo;

fn echo(name: &str, read: fn(Expr) -> Expr) -> FieldDef {
    FieldDef::new(name, Shape::int(), move |ctx, _| {
        Expr::service(ServiceCall::new::<Echo, _>("echo", vec![read(ctx.clone())], Shape::int(), |_, args| {
            Ok(args[0].clone())
        }))
    })
}

#[test]
fn test_underscored_member_and_nested_path_stay_distinct() {
    let release = Shape::object(ObjectShape::new("Release").with_member("year", Shape::int()));
    let film = Shape::object(
        ObjectShape::new("Movie")
            .with_member("release_year", Shape::int())
            .with_member("release", release),
    );
    let mut tree = SelectionTree::new(Shape::object(ObjectShape::new("Query").with_member("movie", film.clone())));
    let movie = tree
        .add(Owner::Operation, &FieldDef::member("movie", film), &none(), None)
        .unwrap();
    tree.add(Owner::Field(movie), &echo("flat", |m| m.member("release_year")), &none(), None)
        .unwrap();
    tree.add(Owner::Field(movie), &echo("nested", |m| m.member("release").member("year")), &none(), None)
        .unwrap();

    let compiled = Engine::default().compile(&tree);
    assert_eq!(
        compiled.stage2().unwrap().expr().to_string(),
        "Query { movie: let $movie = $stage1.movie in Movie { flat: Echo::echo($movie.__release_year), nested: Echo::echo($movie.__release.year) } }"
    );

    let root = Value::from(json!({"movie": {"release_year": 1979, "release": {"year": 2024}}}));
    let value = compiled.execute(&root, &Capabilities::new().with(Echo)).unwrap();
    assert_eq!(
        value.map(|v| v.to_json()),
        Some(json!({"movie": {"flat": 1979, "nested": 2024}}))
    );
}

#[rstest]
fn test_list_with_nested_object_and_service(root: Value) {
    let mut tree = SelectionTree::new(query());
    let movies = tree.add(Owner::Operation, &movies(), &none(), None).unwrap();
    tree.add(Owner::Field(movies), &scalar("name"), &none(), None).unwrap();
    let director = tree
        .add(Owner::Field(movies), &FieldDef::member("director", person()), &none(), None)
        .unwrap();
    tree.add(Owner::Field(director), &FieldDef::member("name", Shape::string()), &none(), None)
        .unwrap();
    tree.add(Owner::Field(movies), &rating(), &none(), None).unwrap();

    let value = Engine::default().execute(&tree, &root, &ratings()).unwrap().unwrap();
    assert_eq!(
        value.to_json(),
        json!({"movies": [
            {"name": "Alien", "director": {"name": "Scott"}, "rating": 10},
            {"name": "Heat", "director": {"name": "Mann"}, "rating": 20},
            {"name": "Ronin", "director": {"name": "Frankenheimer"}, "rating": 30},
        ]})
    );
}

#[rstest]
fn test_service_only_selection_keeps_shell(root: Value) {
    let scale = FieldDef::new("scale", Shape::int(), |_, _| {
        Expr::service(ServiceCall::new::<Ratings, _>("scale", Vec::new(), Shape::int(), |ratings, _| {
            Ok(Value::Int(ratings.scale))
        }))
    });
    let mut tree = SelectionTree::new(query());
    let movies = tree.add(Owner::Operation, &movies(), &none(), None).unwrap();
    tree.add(Owner::Field(movies), &scale, &none(), None).unwrap();

    let compiled = Engine::default().compile(&tree);
    let stage1 = compiled.stage1().executable().unwrap().run(&root, &NoCapabilities).unwrap();
    assert_eq!(stage1.to_json(), json!({"movies": [{}, {}, {}]}));

    let value = compiled.execute(&root, &ratings()).unwrap().unwrap();
    assert_eq!(
        value.to_json(),
        json!({"movies": [{"scale": 10}, {"scale": 10}, {"scale": 10}]})
    );
}

#[rstest]
fn test_fragment_spread(root: Value) {
    let mut tree = SelectionTree::new(query());
    let parts = tree.add_fragment("MovieParts", movie());
    tree.add(Owner::Fragment(parts), &scalar("name"), &none(), None).unwrap();
    tree.add(Owner::Fragment(parts), &rating(), &none(), None).unwrap();

    let movies = tree.add(Owner::Operation, &movies(), &none(), None).unwrap();
    tree.add(Owner::Field(movies), &scalar("id"), &none(), None).unwrap();
    tree.add_spread(Owner::Field(movies), "MovieParts").unwrap();

    let value = Engine::default().execute(&tree, &root, &ratings()).unwrap().unwrap();
    assert_eq!(
        value.to_json(),
        json!({"movies": [
            {"id": 1, "name": "Alien", "rating": 10},
            {"id": 2, "name": "Heat", "rating": 20},
            {"id": 3, "name": "Ronin", "rating": 30},
        ]})
    );
}

#[rstest]
fn test_nested_fragment_spread_without_services(root: Value) {
    let mut tree = SelectionTree::new(query());
    let inner = tree.add_fragment("Year", movie());
    tree.add(Owner::Fragment(inner), &scalar("year"), &none(), None).unwrap();
    let outer = tree.add_fragment("Summary", movie());
    tree.add(Owner::Fragment(outer), &scalar("name"), &none(), None).unwrap();
    tree.add_spread(Owner::Fragment(outer), "Year").unwrap();

    let movies = tree.add(Owner::Operation, &movies(), &none(), None).unwrap();
    tree.add_spread(Owner::Field(movies), "Summary").unwrap();

    let value = Engine::default().execute(&tree, &root, &NoCapabilities).unwrap().unwrap();
    assert_eq!(
        value.to_json(),
        json!({"movies": [
            {"name": "Alien", "year": 1979},
            {"name": "Heat", "year": 1995},
            {"name": "Ronin", "year": 1998},
        ]})
    );
}

#[rstest]
#[case::filter(
    FieldDef::member("movies", Shape::list(movie())).with_extension(FilterExtension),
    none().with("filter", Value::from(json!({"name": "Heat"}))),
    json!([{"id": 2, "rating": 20}])
)]
#[case::sort_and_page(
    FieldDef::member("movies", Shape::list(movie()))
        .with_extension(SortExtension)
        .with_extension(PagingExtension::new(None, Some(10))),
    none().with("sort", Value::from(json!({"year": "DESC"}))).with("skip", 1).with("take", 1),
    json!([{"id": 2, "rating": 20}])
)]
fn test_list_extensions_apply_once(
    root: Value,
    #[case] def: FieldDef,
    #[case] request: RequestArguments,
    #[case] expected: serde_json::Value,
) {
    let mut tree = SelectionTree::new(query());
    let movies = tree.add(Owner::Operation, &def, &request, None).unwrap();
    tree.add(Owner::Field(movies), &scalar("id"), &none(), None).unwrap();
    tree.add(Owner::Field(movies), &rating(), &none(), None).unwrap();

    let compiled = Engine::default().compile(&tree);
    assert!(!compiled.stage2().unwrap().expr().to_string().contains("slice"));

    let value = compiled.execute(&root, &ratings()).unwrap().unwrap();
    assert_eq!(value.member("movies").to_json(), expected);
}

#[rstest]
fn test_arguments_from_variables(root: Value) {
    let mut tree = SelectionTree::new(query());
    let variables = Variables::new().with("movieId", 3);
    let movie = tree
        .add(
            Owner::Operation,
            &movie_by_id(),
            &none().with("id", ArgValue::variable("movieId")),
            Some(&variables),
        )
        .unwrap();
    tree.add(Owner::Field(movie), &scalar("name"), &none(), None).unwrap();

    let value = Engine::default().execute(&tree, &root, &NoCapabilities).unwrap();
    assert_eq!(value.map(|v| v.to_json()), Some(json!({"movie": {"name": "Ronin"}})));
}

#[rstest]
fn test_compiled_query_is_reused_across_variables(root: Value) {
    let mut tree = SelectionTree::new(query());
    let movie = tree
        .add(
            Owner::Operation,
            &movie_by_id(),
            &none().with("id", ArgValue::variable("movieId")),
            Some(&Variables::new().with("movieId", 3)),
        )
        .unwrap();
    tree.add(Owner::Field(movie), &scalar("name"), &none(), None).unwrap();
    tree.add(Owner::Field(movie), &rating(), &none(), None).unwrap();

    let compiled = Engine::default().compile(&tree);
    let stage1 = compiled.stage1().expr().to_string();
    assert!(stage1.contains("$vars.movieId"), "{stage1}");
    assert!(!stage1.contains("== 3"), "{stage1}");

    let provider = ratings();
    assert_eq!(
        compiled.execute(&root, &provider).unwrap().map(|v| v.to_json()),
        Some(json!({"movie": {"name": "Ronin", "rating": 30}}))
    );
    assert_eq!(
        compiled
            .execute_with(&root, &Variables::new().with("movieId", 1), &provider)
            .unwrap()
            .map(|v| v.to_json()),
        Some(json!({"movie": {"name": "Alien", "rating": 10}}))
    );
    assert_eq!(
        compiled
            .execute_with(&root, &Variables::new().with("movieId", 2), &provider)
            .unwrap()
            .map(|v| v.to_json()),
        Some(json!({"movie": {"name": "Heat", "rating": 20}}))
    );
}

#[rstest]
fn test_filter_reads_variables(root: Value) {
    let def = FieldDef::member("movies", Shape::list(movie())).with_extension(FilterExtension);
    let mut tree = SelectionTree::new(query());
    let movies = tree
        .add(
            Owner::Operation,
            &def,
            &none().with("filter", ArgValue::variable("where")),
            Some(&Variables::new().with("where", Value::from(json!({"name": "Heat"})))),
        )
        .unwrap();
    tree.add(Owner::Field(movies), &scalar("id"), &none(), None).unwrap();

    let compiled = Engine::default().compile(&tree);
    assert_eq!(
        compiled.execute(&root, &NoCapabilities).unwrap().map(|v| v.to_json()),
        Some(json!({"movies": [{"id": 2}]}))
    );
    let other = Variables::new().with("where", Value::from(json!({"name": "Alien"})));
    assert_eq!(
        compiled.execute_with(&root, &other, &NoCapabilities).unwrap().map(|v| v.to_json()),
        Some(json!({"movies": [{"id": 1}]}))
    );
}

#[rstest]
#[case::undefined_variable(
    none().with("id", ArgValue::variable("movieId")),
    CompileError::UndefinedVariable("movieId".into())
)]
#[case::missing(none(), CompileError::MissingArgument { field: "movie".into(), argument: "id".into() })]
#[case::unknown(
    none().with("id", 1).with("title", "Heat"),
    CompileError::UnknownArgument { field: "movie".into(), argument: "title".into() }
)]
#[case::invalid(
    none().with("id", "two"),
    CompileError::InvalidArgument {
        field: "movie".into(),
        argument: "id".into(),
        expected: "Int!".into(),
        found: "String".into(),
    }
)]
fn test_structural_errors_abort(#[case] request: RequestArguments, #[case] expected: CompileError) {
    let mut tree = SelectionTree::new(query());
    assert_eq!(tree.add(Owner::Operation, &movie_by_id(), &request, None), Err(expected));
}

#[rstest]
fn test_missing_movie_is_null(root: Value) {
    let mut tree = SelectionTree::new(query());
    let movie = tree
        .add(Owner::Operation, &movie_by_id(), &none().with("id", 99), None)
        .unwrap();
    tree.add(Owner::Field(movie), &scalar("name"), &none(), None).unwrap();
    tree.add(Owner::Field(movie), &rating(), &none(), None).unwrap();

    let value = Engine::default().execute(&tree, &root, &ratings()).unwrap();
    assert_eq!(value.map(|v| v.to_json()), Some(json!({"movie": null})));
}

#[test]
fn test_errors_convert_to_top_level_error() {
    let err: Error = CompileError::UnknownFragment("Parts".into()).into();
    assert!(matches!(err, Error::Compile(_)));
}
