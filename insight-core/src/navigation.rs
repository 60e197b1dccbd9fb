use thiserror::Error;

use crate::outline::PageRef;

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationRejected {
    #[error("invalid page number")]
    InvalidPage,

    #[error("page {page} exceeds total pages ({total})")]
    ExceedsTotalPages { page: u32, total: u32 },

    #[error("viewer not ready")]
    ViewerNotReady,
}

/// Decides whether `page` can be sent to the viewer.
///
/// Structural validity is checked before bounds and bounds before readiness,
/// so a malformed page is never reported as "not ready". Without a known page
/// count only the viewer itself can bound the request.
pub fn validate(
    page: PageRef,
    total_pages: Option<u32>,
    viewer_ready: bool,
) -> Result<u32, NavigationRejected> {
    let page = check_bounds(page, total_pages)?;
    if !viewer_ready {
        return Err(NavigationRejected::ViewerNotReady);
    }
    Ok(page)
}

/// Same predicate minus readiness; used to render an outline row clickable.
pub fn is_navigable(page: PageRef, total_pages: Option<u32>) -> bool {
    check_bounds(page, total_pages).is_ok()
}

fn check_bounds(page: PageRef, total_pages: Option<u32>) -> Result<u32, NavigationRejected> {
    let page = page.page().ok_or(NavigationRejected::InvalidPage)?;
    match total_pages {
        Some(total) if total > 0 && page > total => {
            Err(NavigationRejected::ExceedsTotalPages { page, total })
        }
        _ => Ok(page),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pages_within_range_pass_when_ready() {
        for total in [1u32, 3, 10, 250] {
            for page in 1..=total {
                assert_eq!(validate(PageRef::from(page), Some(total), true), Ok(page));
            }
        }
    }

    #[test]
    fn malformed_pages_are_invalid_regardless_of_state() {
        let malformed = [
            PageRef::from_number(0.0),
            PageRef::from_number(-3.0),
            PageRef::from_number(1.5),
            PageRef::from_number(f64::NAN),
            PageRef::from_number(f64::INFINITY),
            PageRef::from_text("two"),
        ];
        for page in malformed {
            for total in [None, Some(1), Some(100)] {
                for ready in [true, false] {
                    assert_eq!(
                        validate(page, total, ready),
                        Err(NavigationRejected::InvalidPage),
                        "{page:?} total={total:?} ready={ready}"
                    );
                }
            }
        }
    }

    #[test]
    fn bounds_are_reported_before_readiness() {
        for ready in [true, false] {
            assert_eq!(
                validate(PageRef::from(11), Some(10), ready),
                Err(NavigationRejected::ExceedsTotalPages { page: 11, total: 10 })
            );
        }
    }

    #[test]
    fn unknown_page_count_skips_the_bound() {
        assert_eq!(validate(PageRef::from(50), None, true), Ok(50));
        assert_eq!(
            validate(PageRef::from(0), None, true),
            Err(NavigationRejected::InvalidPage)
        );
    }

    #[test]
    fn valid_page_waits_for_viewer() {
        assert_eq!(
            validate(PageRef::from(5), Some(10), false),
            Err(NavigationRejected::ViewerNotReady)
        );
        assert_eq!(
            validate(PageRef::from(5), None, false),
            Err(NavigationRejected::ViewerNotReady)
        );
    }

    #[test]
    fn navigable_ignores_readiness() {
        assert!(is_navigable(PageRef::from(3), Some(10)));
        assert!(is_navigable(PageRef::from(300), None));
        assert!(!is_navigable(PageRef::from(11), Some(10)));
        assert!(!is_navigable(PageRef::from_text("n/a"), None));
    }
}
