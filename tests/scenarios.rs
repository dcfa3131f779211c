use pretty_assertions::assert_eq;
use wfnet::{CommunicationType, Error, PetriNet, Registry, compile_source};

const HEADER: &str = r#"xmlns="http://schemas.microsoft.com/netfx/2009/xaml/activities"
  xmlns:x="http://schemas.microsoft.com/winfx/2006/xaml"
  xmlns:p="http://schemas.microsoft.com/netfx/2009/xaml/servicemodel"
  xmlns:sap="http://schemas.microsoft.com/netfx/2009/xaml/activities/presentation"
  xmlns:mc="http://schemas.openxmlformats.org/markup-compatibility/2006"
  mc:Ignorable="sap""#;

fn workflow(body: &str) -> String {
    format!("<?xml version=\"1.0\" encoding=\"utf-8\"?>\n<Activity {HEADER}>\n{body}\n</Activity>")
}

fn compile(body: &str) -> PetriNet {
    compile_source(&workflow(body), &Registry::standard()).unwrap()
}

fn outgoing(net: &PetriNet, place: &str) -> Vec<String> {
    net.place_by_name(place)
        .unwrap()
        .postset()
        .iter()
        .map(|t| net.transition(*t).unwrap().name().to_string())
        .collect()
}

fn same(net: &PetriNet, a: &str, b: &str) -> bool {
    net.find(a).is_some() && net.find(a) == net.find(b)
}

#[test]
fn test_sequence_of_two_assigns() {
    let net = compile(
        r#"<Sequence sap:VirtualizedContainerService.HintSize="200,100">
  <Sequence.Variables><Variable x:TypeArguments="x:Int32" Name="n" /></Sequence.Variables>
  <Assign><Assign.To><OutArgument x:TypeArguments="x:Int32">[n]</OutArgument></Assign.To></Assign>
  <Assign />
</Sequence>"#,
    );

    let stats = net.statistics();
    assert_eq!((stats.places, stats.transitions, stats.arcs), (3, 2, 4));
    assert!(same(&net, "0.internal.initialized", "2.internal.initialized"));
    assert!(same(&net, "2.internal.closed", "3.internal.initialized"));
    assert!(same(&net, "3.internal.closed", "0.internal.closed"));

    let marked: Vec<_> = net.initial_marking().collect();
    assert_eq!(marked.len(), 1);
    assert!(marked[0].1.knows("0.internal.initialized"));
    assert_eq!(marked[0].1.tokens(), 1);

    let [set] = net.final_sets() else {
        panic!("expected a single final set");
    };
    assert_eq!(set.len(), 1);
    assert_eq!(Some(set[0]), net.find("0.internal.closed"));
}

#[test]
fn test_if_without_else() {
    let net = compile(
        r#"<If Condition="[x &gt; 1]">
  <If.Then><Assign /></If.Then>
</If>"#,
    );

    assert_eq!(
        outgoing(&net, "1.internal.condition"),
        ["1.internal.initthen", "1.internal.initelse"]
    );
    let else_branch = net.find_transition("1.internal.initelse").unwrap();
    let targets: Vec<_> = net.transition(else_branch).unwrap().postset().iter().copied().collect();
    assert_eq!(targets, [net.find("1.internal.closed").unwrap()]);
    assert!(same(&net, "2.internal.closed", "1.internal.closed"));
}

#[test]
fn test_state_machine_two_states() {
    let net = compile(
        r#"<StateMachine InitialState="{x:Reference Waiting}">
  <State x:Name="Waiting">
    <State.Transitions>
      <Transition To="{x:Reference Done}">
        <Transition.Trigger><Delay Duration="00:00:05" /></Transition.Trigger>
      </Transition>
    </State.Transitions>
  </State>
  <State x:Name="Done" IsFinal="True" />
</StateMachine>"#,
    );

    assert!(same(&net, "1.internal.Waiting.initialized", "0.internal.initialized"));
    let fired = net.find_transition("1.internal.Waiting.t1").unwrap();
    let reached: Vec<_> = net.transition(fired).unwrap().postset().iter().copied().collect();
    assert_eq!(reached, [net.find("1.internal.Done.initialized").unwrap()]);

    let [set] = net.final_sets() else {
        panic!("expected a single final set");
    };
    assert_eq!(Some(set[0]), net.find("1.internal.Done.closed"));
}

#[test]
fn test_empty_composites() {
    for body in ["<Sequence />", "<Parallel />", "<Pick />"] {
        let net = compile(body);
        let stats = net.statistics();
        assert_eq!((stats.places, stats.transitions, stats.arcs), (2, 1, 2), "{body}");
        assert_eq!(outgoing(&net, "1.internal.initialized"), ["2.internal.empty"]);
        assert!(same(&net, "2.internal.closed", "1.internal.closed"));
    }
}

#[test]
fn test_service_with_messaging() {
    let source = r#"<WorkflowService xmlns="http://schemas.microsoft.com/netfx/2009/xaml/servicemodel"
    xmlns:a="http://schemas.microsoft.com/netfx/2009/xaml/activities">
  <a:Sequence>
    <Receive OperationName="Order" ServiceContractName="{http://tempuri.org/}IShop" />
    <SendReply />
    <Send OperationName="Ship" ServiceContractName="IShop" />
  </a:Sequence>
</WorkflowService>"#;
    let net = compile_source(source, &Registry::standard()).unwrap();

    let order = net.place_by_name("in.IShop.Order").unwrap();
    assert_eq!(order.kind(), CommunicationType::Input);
    assert_eq!(net.place_by_name("out.3.reply").unwrap().kind(), CommunicationType::Output);
    assert_eq!(net.place_by_name("out.IShop.Ship").unwrap().kind(), CommunicationType::Output);

    let stats = net.statistics();
    assert_eq!((stats.input_places, stats.output_places), (1, 2));
    let receive = net.find_transition("2.internal.receive").unwrap();
    assert_eq!(net.transition(receive).unwrap().kind(), CommunicationType::Input);

    let ports: Vec<_> = net
        .ports()
        .map(|(port, places)| (port.to_string(), places.len()))
        .collect();
    assert_eq!(ports, [("IShop".to_string(), 2), ("reply".to_string(), 1)]);
}

#[test]
fn test_flowchart_loop() {
    let net = compile(
        r#"<Flowchart>
  <Flowchart.StartNode>
    <FlowStep x:Name="work">
      <Assign />
      <FlowStep.Next>
        <FlowDecision x:Name="check" False="{x:Reference work}">
          <FlowDecision.Condition>[done]</FlowDecision.Condition>
        </FlowDecision>
      </FlowStep.Next>
    </FlowStep>
  </Flowchart.StartNode>
</Flowchart>"#,
    );

    assert!(same(&net, "1.internal.work.start", "0.internal.initialized"));
    assert!(same(&net, "1.internal.check.false", "1.internal.work.start"));
    assert!(same(&net, "1.internal.check.true", "0.internal.closed"));
}

#[test]
fn test_structural_error_aborts() {
    let result = compile_source(
        &workflow("<If><If.Otherwise><Assign /></If.Otherwise></If>"),
        &Registry::standard(),
    );
    let Err(Error::Structural { activity, .. }) = result else {
        panic!("expected a structural error, got {result:?}");
    };
    assert_eq!(activity, "If");
}

#[test]
fn test_scan_error() {
    let result = compile_source("<Activity><Sequence></Activity>", &Registry::standard());
    assert!(matches!(result, Err(Error::ScanError(_))));
}
