//! Shared fixtures for unit tests.

pub(crate) mod fixtures {
    use verso_core::CancelToken;

    use crate::catalog::Catalog;

    pub(crate) const REPO: &str = "repo1";

    /// A catalog holding one repository (`repo1`, default branch `master`).
    pub(crate) fn catalog_with_repo() -> (Catalog, CancelToken) {
        let catalog = Catalog::new();
        let cancel = CancelToken::new();
        catalog
            .create_repository(
                &cancel,
                &REPO.parse().unwrap(),
                "mem://bucket1",
                &"master".parse().unwrap(),
            )
            .unwrap();
        (catalog, cancel)
    }
}
