//! Built-in example diagrams.

/// Name of the example loaded when no source is supplied.
pub const DEFAULT_EXAMPLE: &str = "Flowchart";

/// `(name, source)` pairs in menu order.
pub const EXAMPLES: &[(&str, &str)] = &[
    (
        "Flowchart",
        "flowchart TD\n  A[Start] --> B{Is it working?}\n  B -- Yes --> C[Ship it]\n  B -- No  --> D[Fix it]\n  D --> B",
    ),
    (
        "Sequence",
        "sequenceDiagram\n  Alice->>John: Hello John, how are you?\n  John-->>Alice: Great!",
    ),
    (
        "Class",
        "classDiagram\n  class Animal{\n    +int age\n    +String gender\n    +isMammal() boolean\n  }\n  class Duck{\n    +String beakColor\n    +swim() void\n  }\n  Animal <|-- Duck",
    ),
    (
        "Gantt",
        "gantt\n  title Project Timeline\n  dateFormat YYYY-MM-DD\n  section Planning\n  Spec :done, 2024-01-01, 3d\n  Design :active, 2024-01-04, 4d\n  section Implementation\n  Feature A : 2024-01-08, 5d\n  Testing : 2024-01-13, 3d",
    ),
    (
        "Pie",
        "pie showData\n  title Pets adopted by year\n  \"Dogs\" : 386\n  \"Cats\" : 85\n  \"Rats\" : 15",
    ),
    (
        "User Journey",
        "journey\n  title User journey for checkout\n  section Browse\n    Visitor: 5: Explore products\n  section Checkout\n    Visitor: 3: Fill cart\n    Visitor: 2: Pay",
    ),
    (
        "Git",
        "gitGraph\n  commit\n  branch feature\n  checkout feature\n  commit\n  checkout main\n  merge feature",
    ),
    (
        "ERD",
        "erDiagram\n  CUSTOMER ||--o{ ORDER : places\n  ORDER ||--|{ LINE_ITEM : contains\n  CUSTOMER {\n    string name\n    string email\n  }",
    ),
    (
        "XY",
        "xychart-beta\n  title \"Monthly Revenue\"\n  x-axis [Jan, Feb, Mar, Apr]\n  y-axis \"USD\"\n  line [1.2, 2.3, 1.8, 3.2]\n  bar [1, 2, 3, 4]",
    ),
    (
        "Treemap",
        "treemap-beta\n\"Fruits\"\n  \"Citrus\"\n    \"Orange\": 6\n    \"Lemon\": 4\n  \"Berries\"\n    \"Strawberry\": 5\n\"Vegetables\"\n  \"Leafy\"\n    \"Spinach\": 3",
    ),
    (
        "Kanban",
        "kanban\n  todo[Todo]\n    t1[Write spec]\n    t2[Design UI]\n    t3[Research]\n  doing[In Progress]\n    t4[Implement feature]\n    t5[Code review]\n  done[Done]\n    t6[Deploy]\n    t7[Test]",
    ),
    (
        "Architecture",
        "architecture-beta\n  group web(cloud)[Web]\n  service api(server)[API] in web\n  service db(database)[DB]\n  api:R --> L:db",
    ),
];

/// Looks up an example by name, ignoring ASCII case.
pub fn get(name: &str) -> Option<&'static str> {
    let name = name.trim();
    EXAMPLES
        .iter()
        .find(|(n, _)| n.eq_ignore_ascii_case(name))
        .map(|(_, src)| *src)
}

pub fn names() -> impl Iterator<Item = &'static str> {
    EXAMPLES.iter().map(|(n, _)| *n)
}

pub fn default_source() -> &'static str {
    EXAMPLES[0].1
}
