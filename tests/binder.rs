use league_feed::binder::{
    DERIVED_FIELD, FormValues, bind, check_unique_position,
};
use league_feed::error::FieldProblem;
use league_feed::models::{
    ArticlePayload, MatchResult, MatchResultPayload, Team, TeamPayload,
};

fn team_values(games: &str, wins: &str, draws: &str, losses: &str) -> FormValues {
    FormValues::new()
        .with("name", "UD Songo")
        .with("position", "1")
        .with("games", games)
        .with("wins", wins)
        .with("draws", draws)
        .with("losses", losses)
        .with("goals_for", "40")
        .with("goals_against", "10")
}

fn team(id: u64, name: &str, position: u32) -> Team {
    Team {
        id,
        name: name.to_string(),
        position,
        games: 10,
        wins: 5,
        draws: 3,
        losses: 2,
        goals_for: 12,
        goals_against: 8,
        logo_url: None,
    }
}

#[test]
fn team_form_with_consistent_record_binds() {
    let payload = bind::<TeamPayload>(&team_values("18", "15", "2", "1"))
        .expect("consistent record should bind");
    assert_eq!(payload.name, "UD Songo");
    assert_eq!(payload.games, 18);
    assert_eq!(payload.wins, 15);
    assert_eq!(payload.draws, 2);
    assert_eq!(payload.losses, 1);
    assert_eq!(payload.goals_for, 40);
    assert!(payload.pending_logo.is_none());
}

#[test]
fn team_form_rejects_more_decided_games_than_played() {
    let err = bind::<TeamPayload>(&team_values("18", "15", "5", "1"))
        .expect_err("22 decided games out of 18 should fail");
    let derived = err
        .for_field(DERIVED_FIELD)
        .expect("cross-field error should be reported");
    assert!(matches!(derived.problem, FieldProblem::Derived(_)));
    assert!(derived.reason().contains("exceeds games played"));
}

#[test]
fn team_form_reports_each_bad_number() {
    let values = team_values("18", "abc", "-1", "1").with("position", "0");
    let err = bind::<TeamPayload>(&values).expect_err("bad numbers should fail");
    assert_eq!(
        err.for_field("wins").map(|e| e.problem.clone()),
        Some(FieldProblem::NotANumber)
    );
    assert!(matches!(
        err.for_field("draws").map(|e| &e.problem),
        Some(FieldProblem::OutOfRange { min: 0, .. })
    ));
    assert!(matches!(
        err.for_field("position").map(|e| &e.problem),
        Some(FieldProblem::OutOfRange { min: 1, .. })
    ));
}

#[test]
fn numeric_fields_accept_surrounding_whitespace() {
    let values = team_values(" 18 ", "15\t", " 2", "1 ");
    let payload = bind::<TeamPayload>(&values).expect("trimmed numbers should bind");
    assert_eq!(payload.games, 18);
    assert_eq!(payload.wins, 15);
}

#[test]
fn empty_article_title_is_reported_as_missing() {
    let values = FormValues::new()
        .with("title", "   ")
        .with("body", "Match report")
        .with("author", "Newsroom");
    let err = bind::<ArticlePayload>(&values).expect_err("blank title should fail");
    assert_eq!(err.missing_fields(), vec!["title"]);
    assert_eq!(err.to_string(), "missing fields: title");
}

#[test]
fn article_form_keeps_image_path_out_of_the_body() {
    let values = FormValues::new()
        .with("title", "Derby day")
        .with("body", "Report")
        .with("author", "Ana")
        .with("image", "/tmp/derby.jpg");
    let payload = bind::<ArticlePayload>(&values).expect("article should bind");
    assert_eq!(
        payload.pending_image.as_deref(),
        Some(std::path::Path::new("/tmp/derby.jpg"))
    );
    let body = serde_json::to_value(&payload).expect("payload should serialize");
    assert_eq!(body["titulo"], "Derby day");
    assert!(body.get("image").is_none());
    assert!(body["imagem_url"].is_null());
}

#[test]
fn result_form_requires_two_different_teams() {
    let values = FormValues::new()
        .with("round", "19")
        .with("home_team", "UD Songo")
        .with("away_team", "ud songo")
        .with("home_goals", "1")
        .with("away_goals", "1")
        .with("match_date", "2024-10-28");
    let err = bind::<MatchResultPayload>(&values).expect_err("same team twice should fail");
    assert!(err.for_field(DERIVED_FIELD).is_some());
}

#[test]
fn result_form_validates_date() {
    let values = FormValues::new()
        .with("round", "19")
        .with("home_team", "Desportivo Matola")
        .with("away_team", "UD Songo")
        .with("home_goals", "0")
        .with("away_goals", "4")
        .with("match_date", "28/10/2024");
    let err = bind::<MatchResultPayload>(&values).expect_err("non-ISO date should fail");
    assert!(matches!(
        err.for_field("match_date").map(|e| &e.problem),
        Some(FieldProblem::InvalidFormat(_))
    ));

    let ok = bind::<MatchResultPayload>(&values.with("match_date", "2024-10-28"))
        .expect("ISO date should bind");
    assert_eq!(ok.match_date, "2024-10-28");
    assert_eq!(ok.away_goals, 4);
}

#[test]
fn position_must_be_unique_except_for_the_edited_team() {
    let standings = vec![team(1, "UD Songo", 1), team(2, "Ferroviário", 2)];
    let payload = bind::<TeamPayload>(&team_values("18", "15", "2", "1").with("position", "2"))
        .expect("payload should bind");

    let err = check_unique_position(&payload, &standings, None)
        .expect_err("position 2 is taken");
    assert_eq!(
        err.for_field("position").map(|e| e.problem.clone()),
        Some(FieldProblem::Duplicate)
    );
    check_unique_position(&payload, &standings, Some(2))
        .expect("team 2 may keep its own position");
}

#[test]
fn prefill_from_record_binds_back_to_same_values() {
    let result = MatchResult {
        id: 7,
        round: 18,
        home_team: "Nacala".to_string(),
        away_team: "Ferroviario Lichinga".to_string(),
        home_goals: 2,
        away_goals: 2,
        match_date: "2024-10-24".to_string(),
        home_logo: Some("http://cdn/nacala.png".to_string()),
        away_logo: None,
    };
    let values = FormValues::from(&result);
    assert_eq!(values.get("round"), "18");
    assert_eq!(values.get("away_logo"), "");

    let payload = bind::<MatchResultPayload>(&values).expect("prefilled form should bind");
    assert_eq!(payload.home_team, result.home_team);
    assert_eq!(payload.home_logo, result.home_logo);
    assert_eq!(payload.away_logo, None);
}
