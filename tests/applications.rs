mod common;

use univo::{
    applications, clubs,
    error::Error,
    membership::{self, AddMember},
    models::{ApplicationStatus, ClubChanges, MemberStatus, NotificationKind, Role},
    notifications,
};

#[tokio::test]
async fn accepted_applicant_becomes_a_member_with_one_notification() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, "I build robots".into())
        .await
        .unwrap();
    assert_eq!(application.status, ApplicationStatus::Pending);

    let outcome =
        applications::review(&store, application.id, ApplicationStatus::Accepted, admin.id)
            .await
            .unwrap();
    assert_eq!(outcome.application.status, ApplicationStatus::Accepted);
    assert_eq!(outcome.application.reviewed_by, Some(admin.id));
    assert!(outcome.application.reviewed_at.is_some());

    let member = membership::get_role(&store, club.id, applicant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(member.role, Role::Member);
    assert_eq!(member.status, MemberStatus::Active);

    let inbox = notifications::list(&store, applicant.id).await.unwrap();
    assert_eq!(inbox.len(), 1);
    assert_eq!(inbox[0].kind, NotificationKind::Application);
    assert_eq!(inbox[0].related_id, Some(application.id));
    assert!(!inbox[0].is_read);
}

#[tokio::test]
async fn rejection_adds_no_member_and_one_notification() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let outcome =
        applications::review(&store, application.id, ApplicationStatus::Rejected, admin.id)
            .await
            .unwrap();
    assert!(outcome.member.is_none());

    assert!(membership::get_role(&store, club.id, applicant.id)
        .await
        .unwrap()
        .is_none());
    assert_eq!(
        notifications::list(&store, applicant.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn an_application_is_reviewed_only_once() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    applications::review(&store, application.id, ApplicationStatus::Accepted, admin.id)
        .await
        .unwrap();

    for decision in [ApplicationStatus::Accepted, ApplicationStatus::Rejected] {
        let err = applications::review(&store, application.id, decision, admin.id)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::AlreadyReviewed), "{err:?}");
    }

    let rows = membership::list_members(&store, club.id).await.unwrap();
    assert_eq!(rows.iter().filter(|m| m.user_id == applicant.id).count(), 1);
    assert_eq!(
        notifications::list(&store, applicant.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn reviewers_need_an_officer_role() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let member = common::user(&store, "bob").await;
    let applicant = common::user(&store, "carol").await;
    let club = common::club(&store, &admin, "Robotics").await;
    membership::add_member(
        &store,
        admin.id,
        club.id,
        AddMember {
            user_id: member.id,
            role: None,
            status: None,
        },
    )
    .await
    .unwrap();

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let err = applications::review(&store, application.id, ApplicationStatus::Accepted, member.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    let err = applications::review(&store, application.id, ApplicationStatus::Pending, admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)), "{err:?}");

    let err = applications::review(&store, 4242, ApplicationStatus::Accepted, admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound(_)), "{err:?}");
}

#[tokio::test]
async fn accepting_someone_already_added_keeps_their_membership() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let added = membership::add_member(
        &store,
        admin.id,
        club.id,
        AddMember {
            user_id: applicant.id,
            role: Some(Role::Officer),
            status: None,
        },
    )
    .await
    .unwrap();

    let outcome =
        applications::review(&store, application.id, ApplicationStatus::Accepted, admin.id)
            .await
            .unwrap();
    assert_eq!(outcome.application.status, ApplicationStatus::Accepted);
    assert_eq!(outcome.member, Some(added.clone()));

    let rows = membership::list_members(&store, club.id).await.unwrap();
    assert_eq!(rows.iter().filter(|m| m.user_id == applicant.id).count(), 1);
    let role = membership::get_role(&store, club.id, applicant.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(role.role, Role::Officer);
    assert_eq!(
        notifications::list(&store, applicant.id).await.unwrap().len(),
        1
    );
}

#[tokio::test]
async fn withdrawing_a_reviewed_application_leaves_it_untouched() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let reviewed =
        applications::review(&store, application.id, ApplicationStatus::Rejected, admin.id)
            .await
            .unwrap()
            .application;

    let err = applications::withdraw(&store, application.id, applicant.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err:?}");
    let row = store.find_application(application.id).await.unwrap();
    assert_eq!(row, Some(reviewed));
}

#[tokio::test]
async fn only_the_applicant_withdraws_a_pending_application() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let application = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let err = applications::withdraw(&store, application.id, admin.id)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::Forbidden(_)), "{err:?}");

    applications::withdraw(&store, application.id, applicant.id)
        .await
        .unwrap();
    assert!(store.find_application(application.id).await.unwrap().is_none());

    // the slot is free again
    applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
}

#[tokio::test]
async fn members_and_pending_applicants_cannot_apply_again() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let err = applications::apply(&store, club.id, admin.id, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::AlreadyMember), "{err:?}");

    applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap();
    let err = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicatePending), "{err:?}");
}

#[tokio::test]
async fn inactive_clubs_take_no_applications() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;
    clubs::update(
        &store,
        admin.id,
        club.id,
        ClubChanges {
            is_active: Some(false),
            ..Default::default()
        },
    )
    .await
    .unwrap();

    let err = applications::apply(&store, club.id, applicant.id, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::InvalidState(_)), "{err:?}");

    let err = applications::apply(&store, 777, applicant.id, String::new())
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NotFound("club")), "{err:?}");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_applications_leave_one_pending() {
    let store = common::store();
    let admin = common::user(&store, "ada").await;
    let applicant = common::user(&store, "bob").await;
    let club = common::club(&store, &admin, "Robotics").await;

    let (club_id, user_id) = (club.id, applicant.id);
    let attempts: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(
                async move { applications::apply(&store, club_id, user_id, String::new()).await },
            )
        })
        .collect();
    let mut accepted = 0;
    for attempt in attempts {
        match attempt.await.unwrap() {
            Ok(_) => accepted += 1,
            Err(Error::DuplicatePending) => {}
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(accepted, 1);

    let pending = applications::list_for_club(
        &store,
        club.id,
        admin.id,
        Some(ApplicationStatus::Pending),
    )
    .await
    .unwrap();
    assert_eq!(pending.len(), 1);
}
