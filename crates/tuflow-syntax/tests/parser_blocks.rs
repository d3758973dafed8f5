mod common;
use common::*;

use expect_test::expect;

#[test]
fn test_else_if_chain_scopes() {
    let text = "! Geometry\n\
                Cell Size == 5  ! metres\n\
                If Scenario == D01 | D02\n\
                \x20   Read GIS Z Shape == 2d_zsh_D01.shp | 2d_zsh_D01_P.shp\n\
                Else If Scenario == EXG\n\
                \x20   Read GIS Z Shape == 2d_zsh_EXG.shp\n\
                Else\n\
                \x20   Set Code == 0\n\
                End If\n";
    expect![[r#"
        1 comment [Global] "! Geometry"
        2 setting [Global] "Cell Size" = "5"
        3 block [Global] "If Scenario == D01 | D02"
        4 setting [Scenario == D01 | D02] "Read GIS Z Shape" = "2d_zsh_D01.shp | 2d_zsh_D01_P.shp"
        5 block [Global] "Else If Scenario == EXG"
        6 setting [Scenario == EXG & !Scenario == D01 | D02] "Read GIS Z Shape" = "2d_zsh_EXG.shp"
        7 block [Global] "Else"
        8 setting [!Scenario == D01 | D02 & !Scenario == EXG] "Set Code" = "0"
        9 block [Global] "End If"
    "#]]
    .assert_eq(&snapshot_parse(text));
}

#[test]
fn test_event_definitions_and_issues() {
    let text = "Define Event == Q100\n\
                BC Event Source == ~ARI~ | 100y\n\
                End Define\n\
                End If\n\
                If Event == Q100\n";
    expect![[r#"
        1 block [Global] "Define Event == Q100"
        2 setting [Define Event == Q100] "BC Event Source" = "~ARI~ | 100y"
        3 block [Global] "End Define"
        4 block [Global] "End If"
        5 block [Global] "If Event == Q100"
        issue: line 4: 'End If' closes a block that was never opened
        issue: line 5: 'If Event == Q100' is never closed
    "#]]
    .assert_eq(&snapshot_parse(text));
}

#[test]
fn test_parse_is_lossless() {
    let text = "  Read GIS Z Shape == \"gis\\my zsh.shp\"   ! quoted\n\
                \n\
                # hash comment\n\
                Timestep==2.5\n\
                this line has no operator\n";
    let parsed = parse(text);
    assert_eq!(reassemble(&parsed), text);
    assert!(matches!(parsed.lines[4].command.kind(), LineKind::Unparsed | LineKind::Setting));
    assert_eq!(parsed.lines[3].command.rhs(), "2.5");
}

#[test]
fn test_scope_list_contains_explodes_both_sides() {
    let either = Scope::parse(ScopeKind::Scenario, "D01 | D02");
    let one = Scope::parse(ScopeKind::Scenario, "D01");
    assert!(ScopeList::new(vec![either.clone()]).contains(&one));
    assert!(!ScopeList::new(vec![one.clone()]).contains(&either));
    let both = ScopeList::new(vec![one, Scope::parse(ScopeKind::Scenario, "d02")]);
    assert!(both.contains(&either));
}
