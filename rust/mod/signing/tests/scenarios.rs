mod common;

use signing::model::{
    ApplyTo, CreateTemplate, IndividualFilter, LinkStatus, LinkType, NewBinding, Role, SigningKind,
};
use signing::SigningError;

use common::{corporate, env, individual, link_input, ready_link};

#[test]
fn duplicate_link_is_refused() {
    let e = env();
    let first = e.svc.create_link(link_input("orgX", "repoY", None)).unwrap();
    assert!(matches!(
        e.svc.create_link(link_input("orgX", "repoY", None)),
        Err(SigningError::AlreadyExists(_))
    ));
    let ready: Vec<_> = e
        .svc
        .list_all_links()
        .unwrap()
        .into_iter()
        .filter(|l| l.org_repo.repo_id == "repoY")
        .collect();
    assert_eq!(ready.len(), 1);
    assert_eq!(ready[0].link_id, first);
}

#[test]
fn disable_enable_keeps_signature() {
    let e = env();
    let link = ready_link(&e.svc);
    e.svc.sign_individual(&link, individual("a@corp.com")).unwrap();

    e.svc.disable(&link, "a@corp.com").unwrap();
    assert!(e.svc.is_signed(&link, "a@corp.com", SigningKind::Individual).unwrap());
    assert!(!e.svc.get_individual(&link, "a@corp.com").unwrap().enabled);

    e.svc.enable(&link, "a@corp.com").unwrap();
    assert!(e.svc.is_signed(&link, "a@corp.com", SigningKind::Individual).unwrap());
    assert!(e.svc.get_individual(&link, "a@corp.com").unwrap().enabled);

    let all = e.svc.list_individual(&link, &IndividualFilter::default()).unwrap();
    assert_eq!(all.len(), 1);
}

#[test]
fn second_admin_is_duplicate() {
    let e = env();
    let link = ready_link(&e.svc);
    let created = e.svc.sign_corporate(&link, corporate("alice@corp.com", "Corp")).unwrap();

    let bob = signing::model::NewManager {
        id: None,
        name: "Bob".into(),
        email: "bob@corp.com".into(),
    };
    assert!(matches!(
        e.svc.add_admin(&created.signing_id, bob),
        Err(SigningError::DuplicateAdmin)
    ));
    let admins = e.svc.list_managers(&created.signing_id, Some(Role::Admin)).unwrap();
    assert_eq!(admins.len(), 1);
    assert_eq!(admins[0].email, "alice@corp.com");
}

#[test]
fn expired_code_is_denied_and_gone() {
    let e = env();
    let issued = e.svc.issue_code_with_ttl("u@x.com", "signup", 60).unwrap();
    assert_eq!(issued.code.len(), 6);
    e.clock.advance(61);
    assert!(matches!(
        e.svc.verify_code("u@x.com", "signup", &issued.code),
        Err(SigningError::Denied(_))
    ));
    // The attempt consumed the expired code.
    assert!(e.svc.verify_code("u@x.com", "signup", &issued.code).is_err());
    assert_eq!(e.svc.purge_expired_codes().unwrap(), 0);
}

#[test]
fn unlink_hides_signings_and_frees_repo() {
    let e = env();
    let link = ready_link(&e.svc);
    e.svc.sign_individual(&link, individual("a@corp.com")).unwrap();
    e.svc.sign_corporate(&link, corporate("boss@other.org", "Other")).unwrap();

    e.svc.unlink(&link).unwrap();
    assert!(!e.svc.is_signed(&link, "a@corp.com", SigningKind::Individual).unwrap());
    assert!(e.svc.list_corp_signings(&link).unwrap().is_empty());
    assert!(e.svc.sign_individual(&link, individual("b@corp.com")).is_err());

    let relinked = e.svc.create_link(link_input("orgX", "repoY", None)).unwrap();
    assert_ne!(relinked, link);
}

#[test]
fn corporate_lifecycle() {
    let e = env();
    let link = ready_link(&e.svc);
    let created = e.svc.sign_corporate(&link, corporate("alice@corp.com", "Corp")).unwrap();
    let id = &created.signing_id;

    e.svc.add_email_domain(id, "dev.corp.com").unwrap();
    let managers = e
        .svc
        .add_managers(
            id,
            vec![signing::model::NewManager {
                id: Some("carol".into()),
                name: "Carol".into(),
                email: "carol@dev.corp.com".into(),
            }],
        )
        .unwrap();

    let check = e
        .svc
        .authenticate(
            &link,
            &signing::model::Credential {
                identifier: "carol_dev.corp.com".into(),
                password: managers[0].initial_password.clone(),
            },
        )
        .unwrap();
    assert_eq!(check.role, Role::Manager);

    e.svc.sign_employee(&link, individual("dev@dev.corp.com")).unwrap();
    e.svc.enable(&link, "dev@dev.corp.com").unwrap();
    assert!(e.svc.is_signed(&link, "dev@dev.corp.com", SigningKind::Employee).unwrap());
    assert!(e.svc.is_signed(&link, "dev@dev.corp.com", SigningKind::Corporation).unwrap());

    e.svc.upload_corp_pdf(&link, "alice@corp.com", b"%PDF").unwrap();
    e.svc.delete_corp_signing(id).unwrap();
    assert!(!e.svc.is_signed(&link, "dev@dev.corp.com", SigningKind::Corporation).unwrap());
}

fn dco_link(svc: &signing::SigningService) -> (String, String) {
    let template = svc
        .create_template(CreateTemplate {
            title: "DCO".into(),
            url: "https://developercertificate.org".into(),
            content: b"developer certificate of origin".to_vec(),
        })
        .unwrap();
    let mut input = link_input("orgX", "dco-repo", Some(template.id.as_str()));
    input.link_type = LinkType::Dco;
    input.corp_cla = None;
    (svc.create_link(input).unwrap(), template.id)
}

#[test]
fn dco_link_takes_individual_signatures_only() {
    let e = env();
    let mut with_corp = link_input("orgX", "dco-repo", Some("t"));
    with_corp.link_type = LinkType::Dco;
    assert!(matches!(e.svc.create_link(with_corp), Err(SigningError::Validation(_))));

    let (link, template_id) = dco_link(&e.svc);
    assert_eq!(e.svc.get_link(&link).unwrap().link_type, LinkType::Dco);
    let corp_binding = NewBinding {
        template_id,
        language: "english".into(),
        fields: vec![],
        org_signature: None,
    };
    assert!(matches!(
        e.svc.add_binding(&link, ApplyTo::Corporation, &corp_binding),
        Err(SigningError::Validation(m)) if m.contains("dco")
    ));
    assert!(matches!(
        e.svc.sign_corporate(&link, corporate("boss@corp.com", "Corp")),
        Err(SigningError::Validation(m)) if m.contains("individual")
    ));

    e.svc.sign_individual(&link, individual("dev@corp.com")).unwrap();
    assert!(e.svc.is_signed(&link, "dev@corp.com", SigningKind::Individual).unwrap());
}

#[test]
fn signed_dco_cannot_be_removed() {
    let e = env();
    let (link, _) = dco_link(&e.svc);
    e.svc.sign_individual(&link, individual("dev@corp.com")).unwrap();

    assert!(matches!(
        e.svc.remove_binding(&link, ApplyTo::Individual, "english"),
        Err(SigningError::Validation(_))
    ));
    assert!(matches!(e.svc.unlink(&link), Err(SigningError::Validation(_))));
    assert!(e.svc.has_binding(&link, ApplyTo::Individual, "english").unwrap());

    // Once the signer is gone the document and the link can go too.
    e.svc.delete_individual(&link, "dev@corp.com").unwrap();
    e.svc.remove_binding(&link, ApplyTo::Individual, "english").unwrap();
    e.svc.unlink(&link).unwrap();
}

#[test]
fn unsigned_dco_link_can_be_removed() {
    let e = env();
    let (link, _) = dco_link(&e.svc);
    e.svc.unlink(&link).unwrap();
    assert_eq!(e.svc.get_link(&link).unwrap().status, LinkStatus::Deleted);
}

#[test]
fn signatures_record_the_privacy_version() {
    let e = env();
    let link = ready_link(&e.svc);
    let mut unconsented = individual("a@corp.com");
    unconsented.privacy_version.clear();
    assert!(matches!(
        e.svc.sign_individual(&link, unconsented),
        Err(SigningError::Validation(m)) if m.contains("privacy")
    ));
    e.svc.sign_individual(&link, individual("a@corp.com")).unwrap();
    assert_eq!(e.svc.get_individual(&link, "a@corp.com").unwrap().privacy_version, "2024-01");

    let mut corp = corporate("boss@other.org", "Other");
    corp.privacy_version = String::new();
    assert!(matches!(e.svc.sign_corporate(&link, corp), Err(SigningError::Validation(_))));
    e.svc.sign_corporate(&link, corporate("boss@other.org", "Other")).unwrap();
    assert_eq!(
        e.svc.get_corp_signing(&link, "boss@other.org").unwrap().privacy_version,
        "2024-01"
    );
}
