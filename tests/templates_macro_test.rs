use curly::{ENGINE, templates};
use serde_json::json;

templates!("tests/templates/**/*.hbs");

#[test]
fn test_templates_are_registered_before_main() {
    assert!(ENGINE.has_template("page"));
    assert!(ENGINE.has_template("partials/item"));
}

#[test]
fn test_render_registered_template() {
    let data = json!({"title": "T", "items": [{"name": "a"}, {"name": "b"}]});
    assert_eq!(
        curly::render("page", &data).unwrap(),
        "<h1>T</h1>\n<ul>\n  <li>a</li>\n  <li>b</li>\n</ul>\n"
    );
}
